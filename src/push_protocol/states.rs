//! States for the `hexpush` push protocol state machine.
//!
//! This module is private and restricted to the
//! [`push_protocol`](crate::push_protocol) scope. The public interface of the
//! push protocol state machine is provided by
//! [`push_protocol`](crate::push_protocol).
//!
//! Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::{fmt, mem};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, log_enabled, Level::Debug};

use super::events::*;
use super::transfer;

use crate::channel::SerialChannel;
use crate::settings::Settings;
use crate::utils::{load_records, open_and_setup_port, select_port};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state can do any work that needs to be done and
    /// when finished, requests a transition to a `new state` by returning the
    /// appropriate `event`. The `state` and the `event` are consumed to create
    /// the `new state` using the corresponding [`From`] trait implementation
    /// (provided such implementation exists).
    fn run(&mut self, settings: &Settings) -> Event;
}

// Init State ==================================================================

/// The initial state of the push protocol state machine.
///
/// Loads the firmware image into memory first, so that an empty or unreadable
/// image is reported before any traffic is put on the serial link, then opens
/// and configures the serial port, asking the user to pick one when no path
/// was configured.
///
/// From the `InitState`, the state machine can evolve via the following
/// transitions:
///
///  * **[`SwitchToSyncEvent`] => [`SynchronizeState`]** once the image is
///    loaded and the serial port is open,
///  * **[`DoneEvent`] => [`DoneState`]** when the image cannot be read, has
///    no records, or the port cannot be opened.
#[derive(Debug)]
pub(crate) struct InitState {}
impl Runnable for InitState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> Init");

        let records = match load_records(settings) {
            Ok(records) => records,
            Err(ref e) => {
                println!("{}", style(format!("[HP] 💥 {}", e)).red());
                return Event::Done(DoneEvent {
                    settings: settings.clone(),
                    with_errors: true,
                });
            }
        };
        info!("{} records to push", records.len());

        let mut settings = settings.clone();
        while settings.path.is_none() {
            // A canceled selection just refreshes the list of devices.
            settings.path = select_port();
        }

        match open_and_setup_port(&settings) {
            Ok(port) => Event::SwitchToSync(SwitchToSyncEvent {
                channel: SerialChannel::new(port, settings.read_timeout),
                settings,
                records,
            }),
            Err(_) => Event::Done(DoneEvent {
                settings,
                with_errors: true,
            }),
        }
    }
}

// Synchronize State ===========================================================

/// A `state` of the push protocol state machine where `hexpush` forces the
/// bootloader's receiver into the known "awaiting first record" state.
///
/// The device's current state is unknown: it may be idle, mid-way through a
/// record, or waiting for a checksum. Repeatedly sending a terminated record
/// with a bad checksum resets its parser from any of those, and the final
/// un-drained send leaves exactly one status byte pending for the pump.
///
/// This state can transition to another state as follows:
///
///  * **[`SwitchToPumpEvent`] => [`PumpRecordsState`]** upon successful
///    synchronization,
///  * **[`DoneEvent`] => [`DoneState`]** when the serial link fails.
pub(crate) struct SynchronizeState {
    /// The channel over the open serial port.
    ///
    /// Consumed and moved upon the transition to [`PumpRecordsState`].
    pub channel: Option<SerialChannel>,
    /// The firmware image records, carried along to the pump.
    pub records: Vec<Vec<u8>>,
}
impl Runnable for SynchronizeState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> Synchronize");

        if let Some(mut channel) = self.channel.take() {
            println!(
                "[HP] 🔄 Forcing the bootloader into a known state ({} bad records)...",
                settings.sync_repeats
            );

            match transfer::synchronize(&mut channel, settings.sync_repeats, settings.sync_settle)
            {
                Ok(_) => {
                    return Event::SwitchToPump(SwitchToPumpEvent {
                        settings: settings.clone(),
                        channel,
                        records: mem::take(&mut self.records),
                    });
                }
                Err(ref e) => {
                    info!("error: {:?}", e.to_string());
                    println!("{}", style("[HP] 💥 Synchronization failed!").red());
                    return Event::Done(DoneEvent {
                        settings: settings.clone(),
                        with_errors: true,
                    });
                }
            }
        }

        // We should never reach here!
        unreachable!()
    }
}
impl fmt::Debug for SynchronizeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizeState")
            .field("channel", &self.channel)
            .field("records", &self.records.len())
            .finish()
    }
}

// PumpRecords State ===========================================================

/// A `state` of the push protocol state machine where `hexpush` transfers the
/// firmware records, one continuation code per attempt.
///
/// The device paces the transfer: every write is gated on a status byte, so
/// the host can never get ahead of the bootloader. A progress bar tracks how
/// many records the device has started processing.
///
///  * **[`SwitchToDrainEvent`] => [`DrainReportState`]** once every record
///    has been accepted,
///  * **[`DoneEvent`] => [`DoneState`]** when the serial link fails or the
///    device stops responding within the configured timeout.
pub(crate) struct PumpRecordsState {
    /// The channel over the open serial port.
    ///
    /// Consumed and moved upon the transition to [`DrainReportState`].
    pub channel: Option<SerialChannel>,
    /// The firmware image records, in send order.
    pub records: Vec<Vec<u8>>,
}
impl Runnable for PumpRecordsState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!("=> PumpRecords");

        if let Some(mut channel) = self.channel.take() {
            let total = self.records.len();
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[HP] ⏩ Pushing [{bar:40.cyan/blue}] {pos}/{len} records ({eta})")
                    .progress_chars("=>-"),
            );

            let mut on_retry = |completed: usize, _total: usize| {
                pb.set_position(completed as u64);
            };

            match transfer::pump_records(&mut channel, &self.records, &mut on_retry) {
                Ok(_) => {
                    pb.set_position(total as u64);
                    pb.finish();
                    println!("[HP] ✅ All {} records accepted", total);
                    return Event::SwitchToDrain(SwitchToDrainEvent {
                        settings: settings.clone(),
                        channel,
                    });
                }
                Err(ref e) => {
                    pb.abandon();
                    info!("error: {:?}", e.to_string());
                    println!(
                        "{}",
                        style(format!("[HP] 💥 Failed to push the image: {}", e)).red()
                    );
                    return Event::Done(DoneEvent {
                        settings: settings.clone(),
                        with_errors: true,
                    });
                }
            }
        }

        // We should never reach here!
        unreachable!()
    }
}
impl fmt::Debug for PumpRecordsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PumpRecordsState")
            .field("channel", &self.channel)
            .field("records", &self.records.len())
            .finish()
    }
}

// DrainReport State ===========================================================

/// A `state` of the push protocol state machine where `hexpush` surfaces
/// whatever the device emits after the transfer.
///
/// The device gets a settle interval to finish post-transfer work (jumping to
/// the application, printing a banner), then every byte already in the input
/// buffer is dumped to the terminal as-is. Nothing is interpreted.
///
///  * **[`DoneEvent`] => [`DoneState`]** always, with errors only when the
///    serial link fails mid-drain.
#[derive(Debug)]
pub(crate) struct DrainReportState {
    /// The channel over the open serial port. Dropped when this state
    /// completes, closing the port.
    pub channel: Option<SerialChannel>,
}
impl Runnable for DrainReportState {
    fn run(&mut self, settings: &Settings) -> Event {
        use hexplay::HexViewBuilder;
        use std::io::{self, Write};

        info!("=> DrainReport");

        if let Some(mut channel) = self.channel.take() {
            let mut tail: Vec<u8> = Vec::new();
            let result = transfer::drain_trailing(&mut channel, settings.drain_settle, &mut |b| {
                tail.push(b)
            });

            if !tail.is_empty() {
                println!("[HP] 📜 Device said:");
                io::stdout().write_all(&tail).unwrap();
                println!();

                // Dump the received data in a hex table for debugging
                if log_enabled!(Debug) {
                    let view = HexViewBuilder::new(&tail)
                        .address_offset(0)
                        .row_width(16)
                        .finish();
                    println!("{}", view);
                }
            }

            let with_errors = match result {
                Ok(_) => false,
                Err(ref e) => {
                    info!("error: {:?}", e.to_string());
                    true
                }
            };
            return Event::Done(DoneEvent {
                settings: settings.clone(),
                with_errors,
            });
        }

        // We should never reach here!
        unreachable!()
    }
}

// Done State ==================================================================

/// Reached when the push protocol state machine completes its execution and
/// is about to terminate (normally or abnormally).
///
/// This state goes into a 2-phase execution. During the initial phase, it runs
/// like any other state to do its own things like printing some information,
/// cleaning up etc. It then triggers the [`ExitEvent`] to cause the push
/// protocol state machine to terminate and exit.
///
/// Termination due to errors is indicated with the `with_error` field in the
/// state. A partial transfer is not resumable; after an error the whole
/// synchronize-and-push sequence must be restarted from scratch.
#[derive(Debug, Copy, Clone)]
pub(crate) struct DoneState {
    /// When `true`, indicates an abnormal completion caused by an error.
    pub with_error: bool,
    /// When `true` instructs the push protocol state machine to exit its
    /// event loop.
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run(&mut self, settings: &Settings) -> Event {
        info!(
            "=> Done with{}errors",
            if self.with_error { " " } else { " no " }
        );
        // Report errors
        if self.with_error {
            println!(
                "{}",
                style("[HP] 💥 The push was aborted; the device state is unknown.").red()
            );
            println!("[HP] 🔁 Reset the device and run the push again from scratch.");
        }

        Event::Exit(ExitEvent {
            settings: settings.clone(),
            with_error: self.with_error,
        })
    }
}
