//! The byte-oriented duplex transport consumed by the push protocol, and the
//! errors it can surface.
//!
//! The protocol core never talks to `serialport` directly; it goes through
//! the [`Channel`] trait so that the transfer logic can be exercised against
//! a scripted bootloader in tests. The production implementation,
//! [`SerialChannel`], wraps an open serial port.

use std::{fmt, io, thread, time::Duration, time::Instant};

use log::trace;
use serialport::{ClearBuffer, SerialPort};
use thiserror::Error;

// =============================================================================
// Public Interface
// =============================================================================

/// Errors surfaced by a push run.
///
/// None of these are retryable by the host: the only retry in the system is
/// the device-driven `RETRY` continuation code handled inside the record
/// pump. Any error here aborts the run, leaving the device state unspecified;
/// the caller must restart the whole synchronize-and-push sequence.
#[derive(Debug, Error)]
pub enum PushError {
    /// An I/O failure on the serial link. The physical transport is gone or
    /// unusable; there is nothing to recover at this layer.
    #[error("serial transport failure: {0}")]
    Transport(#[source] io::Error),

    /// The device never produced a continuation code within the configured
    /// read timeout. Only observable when a timeout was configured; the
    /// default configuration blocks forever instead.
    #[error("no continuation code from the device within the configured timeout")]
    Stall,

    /// The firmware image contains no records. Reported before any traffic is
    /// put on the serial link.
    #[error("the firmware image has no records to send")]
    EmptyImage,

    /// The firmware image file could not be read.
    #[error("could not read the firmware image: {0}")]
    Image(#[source] io::Error),
}

/// A byte-oriented, blocking, duplex transport.
///
/// This is everything the push protocol needs from the outside world. Reads
/// block until the requested bytes arrive (or, when the implementation
/// carries a deadline, fail with [`PushError::Stall`]); writes push the whole
/// buffer or fail.
pub trait Channel {
    /// Write the whole buffer to the device.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PushError>;

    /// Read exactly `buf.len()` bytes, blocking until they arrive.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), PushError>;

    /// Number of bytes already sitting in the input buffer.
    fn bytes_available(&mut self) -> Result<usize, PushError>;

    /// Throw away everything currently in the input buffer.
    fn discard_input_buffer(&mut self) -> Result<(), PushError>;
}

/// [`Channel`] implementation over an open serial port.
///
/// Reads are realized by polling the port's input buffer and only ever
/// reading bytes that are known to be available. Blocking semantics of raw
/// serial reads differ between platforms and configurations; polling the
/// available count first makes the behavior uniform and lets us layer an
/// optional overall deadline on top.
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    /// Upper bound on how long a single `read_exact` may wait for the device.
    /// `None` blocks forever, which is the default for this protocol.
    read_timeout: Option<Duration>,
}

impl SerialChannel {
    /// Interval between polls of the port's input buffer while waiting for
    /// the device to produce bytes.
    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    pub fn new(port: Box<dyn SerialPort>, read_timeout: Option<Duration>) -> Self {
        SerialChannel { port, read_timeout }
    }
}

impl Channel for SerialChannel {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PushError> {
        io::Write::write_all(&mut self.port, bytes).map_err(PushError::Transport)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), PushError> {
        let deadline = self.read_timeout.map(|timeout| Instant::now() + timeout);

        let mut filled = 0;
        while filled < buf.len() {
            let available = self.bytes_available()?;
            trace!("Bytes available to read: {}", available);

            if available > 0 {
                let wanted = std::cmp::min(available, buf.len() - filled);
                let got = io::Read::read(&mut self.port, &mut buf[filled..filled + wanted])
                    .map_err(PushError::Transport)?;
                filled += got;
                continue;
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(PushError::Stall);
                }
            }
            thread::sleep(Self::POLL_INTERVAL);
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, PushError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| PushError::Transport(e.into()))
    }

    fn discard_input_buffer(&mut self) -> Result<(), PushError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| PushError::Transport(e.into()))
    }
}

impl fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel")
            .field("port", &self.port.name())
            .field("baud_rate", &self.port.baud_rate())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}
