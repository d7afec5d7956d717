//! Events for the `hexpush` push protocol state machine.
//!
//! This module is private and restricted to the
//! [`push_protocol`](crate::push_protocol) scope. The public interface of the
//! push protocol state machine is provided by
//! [`push_protocol`](crate::push_protocol).
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::fmt;

use crate::channel::SerialChannel;
use crate::settings::Settings;

// =============================================================================
// Crate-Public Interface
// =============================================================================

// SwitchToSyncEvent ===========================================================

/// Event fired to trigger a transition to [`SynchronizeState`].
///
/// Happens at the [`InitState`] once the firmware image has been loaded and
/// the serial port has been successfully opened and configured.
pub(crate) struct SwitchToSyncEvent {
    pub settings: Settings,
    /// The channel over the open serial port. Consumed and moved to the next
    /// state.
    pub channel: SerialChannel,
    /// The firmware image records, in the order they will be sent.
    pub records: Vec<Vec<u8>>,
}
impl fmt::Debug for SwitchToSyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchToSyncEvent")
            .field("channel", &self.channel)
            .field("records", &self.records.len())
            .finish()
    }
}

// SwitchToPumpEvent ===========================================================

/// Event fired to trigger a transition to [`PumpRecordsState`].
///
/// Happens at the [`SynchronizeState`] once the bootloader has been forced
/// into the "awaiting first record" state, with one status byte pending.
pub(crate) struct SwitchToPumpEvent {
    pub settings: Settings,
    /// The channel over the open serial port. Consumed and moved to the next
    /// state.
    pub channel: SerialChannel,
    /// The firmware image records, in the order they will be sent.
    pub records: Vec<Vec<u8>>,
}
impl fmt::Debug for SwitchToPumpEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchToPumpEvent")
            .field("channel", &self.channel)
            .field("records", &self.records.len())
            .finish()
    }
}

// SwitchToDrainEvent ==========================================================

/// Event fired to trigger a transition to [`DrainReportState`].
///
/// Happens at the [`PumpRecordsState`] once every record has been accepted by
/// the device.
#[derive(Debug)]
pub(crate) struct SwitchToDrainEvent {
    pub settings: Settings,
    /// The channel over the open serial port. Consumed and moved to the next
    /// state.
    pub channel: SerialChannel,
}

// DoneEvent ===================================================================

/// Event fired when the push protocol execution completes and is about to
/// terminate. It triggers a transition to the `Done` state.
///
/// This event can happen at any state, due to normal completion or to an
/// unrecoverable error. There is no in-protocol recovery: a failed push is
/// restarted from scratch by running the whole state machine again.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub settings: Settings,
    /// When `true`, indicates an abnormal completion caused by an error.
    pub with_errors: bool,
}

// ExitEvent ===================================================================

/// The last event that can be triggered in the push protocol state machine;
/// it makes the event loop terminate with an exit status, handing control
/// back to the caller that started the state machine.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub settings: Settings,
    pub with_error: bool,
}

// Events enum =================================================================

/// Events that can be triggered within the push protocol state machine.
///
/// Each possible value holds an `event`, which in turn may hold additional
/// data for the state transition. Such data is passed by the origin state for
/// use by the target state.
#[derive(Debug)]
pub(crate) enum Event {
    SwitchToSync(SwitchToSyncEvent),
    SwitchToPump(SwitchToPumpEvent),
    SwitchToDrain(SwitchToDrainEvent),
    Done(DoneEvent),
    Exit(ExitEvent),
}
