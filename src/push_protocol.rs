//! `hexpush` serial push protocol.
//!
//! **Example** - Importing the public interfaces through push_protocol:
//! ```ignore
//! use crate::{
//!     push_protocol::{self as ppsm},
//!     settings::Settings,
//! };
//! ```
//!
//! **Example** - Executing the state machine event loop:
//! ```ignore
//! let settings = SettingsBuilder::new()
//!     .path("/dev/ttyUSB0")
//!     .baud_rate(115_200)
//!     .hex_image("build/blinky.hex")
//!     .finalize();
//! let mut ppsm = ppsm::factory(settings);
//! ppsm.run();
//! ```

mod events;
mod state_machine;
mod states;
mod transfer;

pub use state_machine::{factory, PushProtocol};
