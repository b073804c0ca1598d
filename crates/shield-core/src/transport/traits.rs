//! Serial link abstraction.
//!
//! Defines the `SerialLink` trait for raw byte I/O,
//! allowing different implementations (serialport, mock, simulator).

use std::time::Duration;

use crate::protocol::CobsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open serial port \"{port}\": {message}")]
    OpenFailed { port: String, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Timeout when reading from serial port after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Failed to set baud rate {baud}: {message}")]
    BaudRateFailed { baud: u32, message: String },

    #[error("Failed to send break: {0}")]
    BreakFailed(String),

    #[error("Link disconnected")]
    Disconnected,

    #[error("Framing error: {0}")]
    Framing(#[from] CobsError),
}

impl TransportError {
    /// Errors that a lower baud rate may cure.
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout { .. } | TransportError::Framing(_)
        )
    }
}

/// Raw byte-level serial link.
///
/// This trait enables:
/// - Production implementation using serialport
/// - Mock implementation for unit testing
/// - Simulated device for end-to-end tests
pub trait SerialLink: Send {
    /// Write all bytes to the link.
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read available bytes, blocking up to `timeout`.
    ///
    /// Returns `Ok(0)` if nothing arrived in time.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Hold the line in the break condition for `duration`.
    fn send_break(&mut self, duration: Duration) -> Result<(), TransportError>;

    /// Change the local baud rate.
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError>;

    /// Current local baud rate.
    fn baud_rate(&self) -> u32;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write_all(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).read(buf, timeout)
    }

    fn send_break(&mut self, duration: Duration) -> Result<(), TransportError> {
        (**self).send_break(duration)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        (**self).set_baud_rate(baud)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }
}
