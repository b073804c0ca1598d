//! Mock serial link for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{SerialLink, TransportError};
use crate::protocol::cobs;
use crate::protocol::constants::FRAME_DELIMITER;

/// Mock link for unit testing packet and command logic.
///
/// Clones share state, so a test can keep a handle for inspection after the
/// link has been moved into a transport.
#[derive(Clone)]
pub struct MockLink {
    /// Bytes to return on read.
    rx_queue: Arc<Mutex<VecDeque<u8>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<u8>>>,
    /// Number of break signals sent.
    breaks: Arc<Mutex<usize>>,
    /// Current baud rate.
    baud: Arc<Mutex<u32>>,
    /// Whether the link is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockLink {
    pub fn new(baud: u32) -> Self {
        Self {
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            breaks: Arc::new(Mutex::new(0)),
            baud: Arc::new(Mutex::new(baud)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue raw bytes to be returned on read.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.rx_queue.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Queue an encoded, delimited packet.
    pub fn queue_packet(&self, packet: &[u8]) {
        let mut frame = cobs::encode(packet);
        frame.push(FRAME_DELIMITER);
        self.queue_bytes(&frame);
    }

    /// Bytes not yet consumed by reads.
    pub fn pending(&self) -> usize {
        self.rx_queue.lock().unwrap().len()
    }

    /// All bytes written so far.
    pub fn written(&self) -> Vec<u8> {
        self.write_log.lock().unwrap().clone()
    }

    /// Written bytes split on the delimiter and decoded.
    pub fn sent_packets(&self) -> Vec<Vec<u8>> {
        let log = self.write_log.lock().unwrap();
        log.split(|&b| b == FRAME_DELIMITER)
            .take(log.iter().filter(|&&b| b == FRAME_DELIMITER).count())
            .map(|frame| cobs::decode(frame).unwrap_or_default())
            .collect()
    }

    pub fn break_count(&self) -> usize {
        *self.breaks.lock().unwrap()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if *self.connected.lock().unwrap() {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new(crate::protocol::constants::INITIAL_BAUD_RATE)
    }
}

impl SerialLink for MockLink {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.check_connected()?;
        self.write_log.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        self.check_connected()?;
        let mut queue = self.rx_queue.lock().unwrap();
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn send_break(&mut self, _duration: Duration) -> Result<(), TransportError> {
        self.check_connected()?;
        *self.breaks.lock().unwrap() += 1;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        *self.baud.lock().unwrap() = baud;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        *self.baud.lock().unwrap()
    }
}
