//! Settings for the serial port and the push protocol tuning.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings related to the serial port and the push protocol, and
/// acts as the product of [`SettingsBuilder`].
///
/// The synchronization repeat count and the settle intervals are empirical:
/// they are not mandated by the bootloader protocol, but must be large enough
/// to cover the target device's worst-case recovery latency from an unknown
/// receiver state. The defaults match the reference bootloader; tune them per
/// device rather than treating them as constants.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// Path to the firmware image to be pushed. Optional; when not set,
    /// `hexpush` offers the `.hex` files in the current working directory for
    /// selection.
    pub hex_image: Option<String>,

    /// How many bad-checksum records to send while forcing the bootloader
    /// into a known state.
    pub sync_repeats: usize,
    /// Wait after each synchronization record, giving the device one
    /// processing cycle before further I/O.
    pub sync_settle: Duration,
    /// Wait after the transfer before collecting the device's trailing
    /// diagnostic output.
    pub drain_settle: Duration,
    /// Upper bound on waiting for a continuation code from the device. When
    /// `None` (the default), reads block forever.
    pub read_timeout: Option<Duration>,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```ignore
/// let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 115_200,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                hex_image: None,
                sync_repeats: 10,
                sync_settle: Duration::from_millis(100),
                drain_settle: Duration::from_millis(1000),
                read_timeout: None,
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the path to the firmware image to be pushed
    pub fn hex_image<'a>(mut self, hex_image: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.hex_image = Some(hex_image.into().as_ref().to_owned());
        self
    }

    /// Set the number of bad-checksum records sent during synchronization
    pub fn sync_repeats(mut self, sync_repeats: usize) -> Self {
        self.settings.sync_repeats = sync_repeats;
        self
    }

    /// Set the settle interval after each synchronization record
    pub fn sync_settle(mut self, sync_settle: Duration) -> Self {
        self.settings.sync_settle = sync_settle;
        self
    }

    /// Set the settle interval before draining the device's trailing output
    pub fn drain_settle(mut self, drain_settle: Duration) -> Self {
        self.settings.drain_settle = drain_settle;
        self
    }

    /// Bound the wait for a continuation code from the device
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.settings.read_timeout = Some(read_timeout);
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        SettingsBuilder::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            path: None,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            hex_image: None,
            sync_repeats: 10,
            sync_settle: Duration::from_millis(100),
            drain_settle: Duration::from_millis(1000),
            read_timeout: None,
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn baud_rate() {
    let baud_rate = 4_800;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn data_bits() {
    let data_bits = DataBits::Seven;
    let settings = SettingsBuilder::new().data_bits(data_bits).finalize();
    assert_eq!(settings.data_bits, data_bits);
}

#[test]
fn flow_control() {
    let flow_control = FlowControl::Hardware;
    let settings = SettingsBuilder::new().flow_control(flow_control).finalize();
    assert_eq!(settings.flow_control, flow_control);
}

#[test]
fn stop_bits() {
    let stop_bits = StopBits::Two;
    let settings = SettingsBuilder::new().stop_bits(stop_bits).finalize();
    assert_eq!(settings.stop_bits, stop_bits);
}

#[test]
fn parity() {
    let parity = Parity::Even;
    let settings = SettingsBuilder::new().parity(parity).finalize();
    assert_eq!(settings.parity, parity);
}

#[test]
fn hex_image() {
    let settings = SettingsBuilder::new().hex_image("blinky.hex").finalize();
    assert_eq!(settings.hex_image.unwrap(), "blinky.hex");
}

#[test]
fn sync_tuning() {
    let settings = SettingsBuilder::new()
        .sync_repeats(20)
        .sync_settle(Duration::from_millis(250))
        .finalize();
    assert_eq!(settings.sync_repeats, 20);
    assert_eq!(settings.sync_settle, Duration::from_millis(250));
}

#[test]
fn drain_settle() {
    let settings = SettingsBuilder::new()
        .drain_settle(Duration::from_secs(2))
        .finalize();
    assert_eq!(settings.drain_settle, Duration::from_secs(2));
}

#[test]
fn read_timeout() {
    let settings = SettingsBuilder::new()
        .read_timeout(Duration::from_secs(5))
        .finalize();
    assert_eq!(settings.read_timeout, Some(Duration::from_secs(5)));
}
