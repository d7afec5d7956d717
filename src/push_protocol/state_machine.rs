//! `hexpush` push protocol state machine.
//!
//! A push run goes through three phases over one exclusively-owned serial
//! channel: first the bootloader is forced into a known receiver state
//! (synchronize), then the firmware records are transferred one
//! continuation code at a time (pump), and finally whatever the device emits
//! after the transfer is surfaced (drain). The phases execute strictly in
//! sequence on a single thread; every serial write is gated by a prior
//! blocking read, which is the protocol's only flow control.
//!
//! ```text
//!    START
//!      |
//!      v
//!  .-------.      .-------------.      .-------------.      .-------------.
//!  | Init  |----->| Synchronize |----->| PumpRecords |----->| DrainReport |
//!  '-------'      '-------------'      '-------------'      '-------------'
//!      |                 |                    |                    |
//!      |  error          |  error             |  error             |
//!      '---------------->+<-------------------'                    |
//!                        v                                         |
//!                    .-------.                                     |
//!                    | Done  |<------------------------------------'
//!                    '-------'
//!                        |
//!                        v
//!                       END
//! ```

use super::events::*;
use super::states::*;
use crate::settings::Settings;

// =============================================================================
// Public Interface
// =============================================================================

/// Represents the `hexpush` push protocol state machine. Use the `factory()`
/// function to get an instance then run it by calling its `run()` method.
pub struct PushProtocol {
    sm: ProtocolStates,
}
impl PushProtocol {
    /// The push protocol state machine event loop runs until the `Done` state
    /// is reached and its `should_exit` flag is set. At such point, the event
    /// loop terminates and returns an exit code indicating no errors when
    /// equal to **`0`**; otherwise a termination with error.
    pub fn run(&mut self) -> i8 {
        loop {
            self.sm = self.sm.step();
            if let ProtocolStates::Done(sm) = &self.sm {
                if sm.state.should_exit {
                    return if sm.state.with_error { 1 } else { 0 };
                }
            }
        }
    }
}

/// Factory function for the `hexpush` push protocol state machine. Use it to
/// get an instance of the state machine, which you can run by invoking its
/// `run()` method.
pub fn factory(settings: Settings) -> PushProtocol {
    PushProtocol {
        // The machine naturally starts in the `Init` state.
        sm: ProtocolStates::Init(ProtocolSM::new(settings)),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine implementing the push protocol.
///
/// This is a private interface, abstracted for a simpler and more intuitive
/// use in the public `PushProtocol` interface.
///
/// Note that using a generic type that holds the current state serves two
/// purposes. It allows for also having shared data by all states that is not
/// really part of state data (e.g. state machine parameters, statistics,
/// etc...). Additionally, it's nicer when debugging to see the state machine
/// and the current state it is holding at any time.
#[derive(Debug)]
struct ProtocolSM<S: Runnable> {
    settings: Settings,
    state: S,
}
impl<S: Runnable> ProtocolSM<S> {
    fn run(&mut self) -> Event {
        self.state.run(&self.settings)
    }
}

/// The state machine starts in the `InitState`.
impl ProtocolSM<InitState> {
    fn new(settings: Settings) -> Self {
        ProtocolSM {
            settings,
            state: InitState {},
        }
    }
}

/// An enum wrapper around the states of the push protocol state machine. It
/// provides a simpler and more intuitive model for manipulating states and
/// their transitions.
enum ProtocolStates {
    Init(ProtocolSM<InitState>),
    Synchronize(ProtocolSM<SynchronizeState>),
    PumpRecords(ProtocolSM<PumpRecordsState>),
    DrainReport(ProtocolSM<DrainReportState>),
    Done(ProtocolSM<DoneState>),
}
impl ProtocolStates {
    /// The unit of work in the state machine event loop. It checks the
    /// current state and the current event and decides the next transition.
    /// State transitions from events are implemented using the rust
    /// `From`/`Into` pattern. Most of the potential errors of
    /// state/event/transition mismatches can be caught at compile time.
    fn step(&mut self) -> Self {
        match self {
            ProtocolStates::Init(sm) => {
                let event = sm.run();
                match event {
                    Event::SwitchToSync(ev) => ProtocolStates::Synchronize(ev.into()),
                    Event::Done(ev) => ProtocolStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProtocolStates::Synchronize(sm) => {
                let event = sm.run();
                match event {
                    Event::SwitchToPump(ev) => ProtocolStates::PumpRecords(ev.into()),
                    Event::Done(ev) => ProtocolStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProtocolStates::PumpRecords(sm) => {
                let event = sm.run();
                match event {
                    Event::SwitchToDrain(ev) => ProtocolStates::DrainReport(ev.into()),
                    Event::Done(ev) => ProtocolStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProtocolStates::DrainReport(sm) => {
                let event = sm.run();
                match event {
                    Event::Done(ev) => ProtocolStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProtocolStates::Done(sm) => {
                let event = sm.run();
                match event {
                    Event::Exit(ev) => ProtocolStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<SwitchToSyncEvent> for ProtocolSM<SynchronizeState> {
    fn from(event: SwitchToSyncEvent) -> ProtocolSM<SynchronizeState> {
        ProtocolSM {
            settings: event.settings,
            state: SynchronizeState {
                channel: Some(event.channel),
                records: event.records,
            },
        }
    }
}

impl From<SwitchToPumpEvent> for ProtocolSM<PumpRecordsState> {
    fn from(event: SwitchToPumpEvent) -> ProtocolSM<PumpRecordsState> {
        ProtocolSM {
            settings: event.settings,
            state: PumpRecordsState {
                channel: Some(event.channel),
                records: event.records,
            },
        }
    }
}

impl From<SwitchToDrainEvent> for ProtocolSM<DrainReportState> {
    fn from(event: SwitchToDrainEvent) -> ProtocolSM<DrainReportState> {
        ProtocolSM {
            settings: event.settings,
            state: DrainReportState {
                channel: Some(event.channel),
            },
        }
    }
}

impl From<DoneEvent> for ProtocolSM<DoneState> {
    fn from(event: DoneEvent) -> ProtocolSM<DoneState> {
        ProtocolSM {
            settings: event.settings,
            state: DoneState {
                with_error: event.with_errors,
                should_exit: false,
            },
        }
    }
}
impl From<ExitEvent> for ProtocolSM<DoneState> {
    fn from(event: ExitEvent) -> ProtocolSM<DoneState> {
        ProtocolSM {
            settings: event.settings,
            state: DoneState {
                with_error: event.with_error,
                should_exit: true,
            },
        }
    }
}
