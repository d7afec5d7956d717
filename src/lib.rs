//! Hexpush uploads a firmware image to a board running a minimal serial
//! bootloader. The image is an Intel-HEX-style text file, but `hexpush` never
//! parses it: every line is an opaque record sent verbatim, and all
//! validation happens on the device.
//!
//! The bootloader's receiver state at connect time is unknown, so a push
//! starts by forcing it into a known "awaiting first record" state with a
//! burst of deliberately bad-checksum records, the way the reference
//! `raspbootin`-style loaders resynchronize before streaming. After that the
//! device drives the whole transfer with one status byte per record: `'A'`
//! asks for the current record (again), anything else advances. Once every
//! record is accepted, whatever the device prints next (typically the
//! application banner) is dumped to the terminal.
//!
//! Most of the functionality in `hexpush` is implemented as a state machine.
//! State machines are implemented in terms of **states** and **transitions**
//! between them with the following characteristics:
//!
//! * Can only be in one state at any time.
//! * Each state can have its own associated data if needed.
//! * It is possible to have some shared data between **all** states.
//! * Transitions between states are triggered via typed **events** and follow
//!   defined semantics.
//! * Only explicitly defined transitions should be permitted and as many
//!   errors should be detected at **compile-time**.
//! * Transitioning from one state to another consumes the original state and
//!   renders it unusable. Any transition back to that state would create a
//!   new state.
//! * Data can be transferred from one state to the next by attaching it to
//!   the transition event. Such data is statically defined as part of the
//!   event type.
//!
//! The implementation of state transitions leverages `rust`'s `From` and
//! `Into` pattern. The `From` trait allows for a type to define how to create
//! itself from another type, hence providing us an intuitive and simple
//! mechanism for converting `events` into new `states`. Only transitions for
//! which the `From` trait is implemented are authorized and any other
//! transition would be detected at compile-time as an error.
//!
//! The protocol core itself (synchronize, pump, drain) is written against the
//! [`Channel`] trait rather than a concrete serial port, so it can be
//! exercised in tests against a scripted bootloader.

mod channel;
mod push_protocol;
mod settings;
mod utils;

pub use channel::{Channel, PushError, SerialChannel};
pub use push_protocol::{factory, PushProtocol};
pub use settings::{Settings, SettingsBuilder};
