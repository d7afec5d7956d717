//! Serial port device manipulation.

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use serialport::{available_ports, SerialPort, SerialPortType};

use std::{thread, time::Duration};

use crate::Settings;

//==============================================================================
// Crate-Public Interface
//==============================================================================

/// Interactively select a serial port among the ones connected to the system.
///
/// When no device is connected yet, keep enumerating with a spinner until one
/// shows up; the user can plug the board in while `hexpush` is waiting. The
/// user may cancel the selection to request a refresh of the connected
/// devices, in which case `None` is returned and the caller may ask again.
pub(crate) fn select_port() -> Option<String> {
    let mut found_ports;
    let mut attempt: usize = 1;
    let waiting_period: usize = 1;

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(120);
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])
            .template("[HP] {spinner:.blue} {msg}"),
    );

    // Avoid cursor flicker during the waiting
    Term::stdout().hide_cursor().unwrap();
    // Enumerate connected USB serial devices until we have some.
    loop {
        found_ports = enumerate_usb_serial_ports();
        let num_ports = found_ports.len();
        if num_ports > 0 {
            pb.finish_with_message("Select a port to be used:");
            break;
        } else {
            let waited = attempt * waiting_period;
            pb.set_message(format!(
                "[{:03}s {}] ⌛ Waiting for USB serial controller to be connected...",
                style(waited).dim(),
                num_ports
            ));
            attempt += 1;
        }

        thread::sleep(Duration::from_secs(waiting_period as u64));
    }
    Term::stdout().show_cursor().unwrap();

    let selection = select_port_interactive(&found_ports);
    match &selection {
        Some(path) => {
            pb.finish_with_message(format!("👍 Serial port {} is ready", style(path).green()));
        }
        None => {
            pb.finish_with_message("❌ Selection canceled -> refreshing...");
        }
    }
    selection
}

/// Open the serial port named in `settings` and configure it with the serial
/// parameters from `settings`.
///
/// Opening is retried a few times with a fixed delay; boards frequently
/// re-enumerate right after being plugged in and the device node may not be
/// usable on the first attempt.
pub(crate) fn open_and_setup_port(
    settings: &Settings,
) -> Result<Box<dyn SerialPort>, serialport::Error> {
    use retry::{delay, retry_with_index};

    let result = retry_with_index(
        delay::Fixed::from_millis(1000).take(4),
        |index| -> Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Trying to connect {}", index);
            // Open the port
            let path = settings.path.clone().unwrap();
            let builder = serialport::new(&path, settings.baud_rate)
                .data_bits(settings.data_bits)
                .stop_bits(settings.stop_bits)
                .parity(settings.parity)
                .flow_control(settings.flow_control);
            builder.open()
        },
    );
    match result {
        Ok(mut port) => {
            // Configure the port with the values in `settings`. TODO: This is
            // probably temporary until `serialport` configures the port after
            // `open` by itself.
            port.set_baud_rate(settings.baud_rate)?;
            port.set_data_bits(settings.data_bits)?;
            port.set_stop_bits(settings.stop_bits)?;
            port.set_parity(settings.parity)?;
            port.set_flow_control(settings.flow_control)?;

            info!(
                "Connected to {} at {} baud",
                port.name().unwrap(),
                port.baud_rate().unwrap()
            );
            debug!("data_bits    : {:#?}", port.data_bits().unwrap());
            debug!("stop_bits    : {:#?}", port.stop_bits().unwrap());
            debug!("parity       : {:#?}", port.parity().unwrap());
            debug!("flow control : {:#?}", port.flow_control().unwrap());

            assert_eq!(
                settings.baud_rate,
                port.baud_rate().unwrap(),
                "\n\n\
                 --> Failed to set the baud rate to the desired value {} which\n    \
                 is probably because it is not a valid one.\n    \
                 Change it to a good one in the command line arguments, or\n    \
                 don't specify it at all. The default value will be used.\n\
                 \n",
                settings.baud_rate
            );
            assert_eq!(settings.data_bits, port.data_bits().unwrap());
            assert_eq!(settings.stop_bits, port.stop_bits().unwrap());
            assert_eq!(settings.parity, port.parity().unwrap());

            Ok(port)
        }
        Err(err) => match err {
            retry::Error::Operation {
                error,
                total_delay,
                tries,
            } => {
                info!(
                    "Failed to open the port after {:?} and {} tries: {}",
                    total_delay, tries, error,
                );
                Err(error)
            }
            retry::Error::Internal(_) => {
                info!("Internal retry error while opening port");
                Err(serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "internal error while retrying to open the port",
                ))
            }
        },
    }
}

//==============================================================================
// Private stuff
//==============================================================================

/// Enumerates serial devices of type USB on the system
fn enumerate_usb_serial_ports() -> Vec<String> {
    let mut usb_ports = vec![];
    match available_ports() {
        Ok(ports) => {
            for p in ports {
                match p.port_type {
                    // USB ports give us more info about the connected serial
                    // controller
                    SerialPortType::UsbPort(info) => {
                        let extended_name = format!(
                            "{}: ({} / {})",
                            p.port_name,
                            info.manufacturer.as_ref().map_or("", String::as_str),
                            info.product.as_ref().map_or("", String::as_str)
                        );
                        usb_ports.push(extended_name);
                    }
                    // We're also interested in the other devices, such as
                    // virtual ports for testing
                    _ => {
                        usb_ports.push(p.port_name);
                    }
                }
            }
        }
        Err(ref e) => {
            info!("error: {}", e.to_string());
        }
    }
    usb_ports
}

fn select_port_interactive(ports: &[String]) -> Option<String> {
    use dialoguer::{theme::ColorfulTheme, Select};

    let term = Term::buffered_stderr();
    let theme = ColorfulTheme::default();

    let mut select = Select::with_theme(&theme);
    for item in ports {
        select.item(item);
    }

    let selection = select.default(0).interact_on_opt(&term).unwrap();
    selection.map(|x| String::from(ports.get(x).unwrap().split(':').next().unwrap()))
}
