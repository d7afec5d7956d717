//! Helper functions for serial ports and firmware images.

mod image;
mod ports;

pub(crate) use image::load_records;
pub(crate) use ports::{open_and_setup_port, select_port};
