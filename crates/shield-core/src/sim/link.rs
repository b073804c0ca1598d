//! Host side of the simulated serial line.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::transport::{SerialLink, TransportError};

/// What the host puts on the line.
#[derive(Debug)]
pub(crate) enum LineSignal {
    /// Bytes clocked at the given baud rate.
    Bytes(Vec<u8>, u32),
    /// Break condition.
    Break,
}

/// Bytes clocked by the device at the given baud rate.
pub(crate) type DeviceBytes = (Vec<u8>, u32);

/// [`SerialLink`] connected to a simulated shield running on its own thread.
///
/// Bytes sent at a baud rate the other end is not using are lost.
pub struct SimLink {
    to_device: Option<Sender<LineSignal>>,
    from_device: Receiver<DeviceBytes>,
    pending: VecDeque<u8>,
    baud: u32,
    device: Option<JoinHandle<()>>,
}

impl SimLink {
    pub(crate) fn new(
        to_device: Sender<LineSignal>,
        from_device: Receiver<DeviceBytes>,
        baud: u32,
        device: JoinHandle<()>,
    ) -> Self {
        Self {
            to_device: Some(to_device),
            from_device,
            pending: VecDeque::new(),
            baud,
            device: Some(device),
        }
    }

    fn signal(&self, signal: LineSignal) -> Result<(), TransportError> {
        self.to_device
            .as_ref()
            .ok_or(TransportError::Disconnected)?
            .send(signal)
            .map_err(|_| TransportError::Disconnected)
    }
}

impl SerialLink for SimLink {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.signal(LineSignal::Bytes(data.to_vec(), self.baud))
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let deadline = Instant::now() + timeout;

        while self.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.from_device.recv_timeout(remaining) {
                Ok((bytes, baud)) if baud == self.baud => self.pending.extend(bytes),
                Ok((bytes, baud)) => {
                    trace!(len = bytes.len(), baud, local = self.baud, "Dropped bytes at wrong baud");
                }
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Disconnected),
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn send_break(&mut self, _duration: Duration) -> Result<(), TransportError> {
        self.pending.clear();
        self.signal(LineSignal::Break)
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        self.baud = baud;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }
}

impl Drop for SimLink {
    fn drop(&mut self) {
        // Hanging up the line stops the device thread
        self.to_device.take();
        if let Some(device) = self.device.take() {
            let _ = device.join();
        }
    }
}
