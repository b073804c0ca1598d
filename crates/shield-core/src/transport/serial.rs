//! serialport-based link implementation.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::traits::{SerialLink, TransportError};

/// Serial link backed by the `serialport` crate.
pub struct SerialportLink {
    port: Box<dyn serialport::SerialPort>,
    baud: u32,
}

impl SerialportLink {
    /// Open `port_name` at `baud`, 8N1, no flow control.
    #[instrument(level = "info")]
    pub fn open(port_name: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(port_name, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| TransportError::OpenFailed {
                port: port_name.to_string(),
                message: e.to_string(),
            })?;

        info!(port = %port_name, baud, "Serial port opened");

        Ok(Self { port, baud })
    }
}

impl SerialLink for SerialportLink {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        self.port
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    fn send_break(&mut self, duration: Duration) -> Result<(), TransportError> {
        self.port
            .set_break()
            .map_err(|e| TransportError::BreakFailed(e.to_string()))?;
        thread::sleep(duration);
        self.port
            .clear_break()
            .map_err(|e| TransportError::BreakFailed(e.to_string()))?;
        debug!(duration_ms = duration.as_millis() as u64, "Break sent");
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        self.port
            .set_baud_rate(baud)
            .map_err(|e| TransportError::BaudRateFailed {
                baud,
                message: e.to_string(),
            })?;
        self.baud = baud;
        info!(baud, "Local baud rate changed");
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }
}
