//! Packet transport: delimited, COBS-encoded packets over a serial link.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use super::traits::{SerialLink, TransportError};
use crate::protocol::cobs;
use crate::protocol::constants::{
    BREAK_DURATION_MS, FLUSH_PACKETS, FRAME_DELIMITER, READ_TIMEOUT_MS, RESET_SETTLE_MS,
};

/// Packet-level transport used by the command client and file sessions.
///
/// Every `send` is answered by exactly one `receive` before the next `send`.
pub trait PacketTransport {
    /// Encode and send one packet.
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError>;

    /// Receive and decode one packet.
    fn receive(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Break the link, settle, and flush the device's decoder.
    fn reset(&mut self) -> Result<(), TransportError>;

    /// Change the local baud rate. The device must already have been told.
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError>;
}

impl<T: PacketTransport + ?Sized> PacketTransport for &mut T {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        (**self).send(packet)
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).receive()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        (**self).set_baud_rate(baud)
    }
}

/// Link timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    /// Maximum wait for a frame terminator.
    pub read_timeout: Duration,
    /// Length of the break condition on reset.
    pub break_duration: Duration,
    /// Pause after the break before sending anything.
    pub reset_settle: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(READ_TIMEOUT_MS),
            break_duration: Duration::from_millis(BREAK_DURATION_MS),
            reset_settle: Duration::from_millis(RESET_SETTLE_MS),
        }
    }
}

/// COBS packet stream over a [`SerialLink`].
pub struct PacketStream<L: SerialLink> {
    link: L,
    timing: LinkTiming,
    /// Bytes read past the last terminator.
    rx_buf: Vec<u8>,
}

impl<L: SerialLink> PacketStream<L> {
    pub fn new(link: L) -> Self {
        Self::with_timing(link, LinkTiming::default())
    }

    pub fn with_timing(link: L, timing: LinkTiming) -> Self {
        Self {
            link,
            timing,
            rx_buf: Vec::new(),
        }
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn baud_rate(&self) -> u32 {
        self.link.baud_rate()
    }

    /// Take one complete frame (terminator stripped) out of the receive buffer.
    fn take_frame(&mut self) -> Option<Vec<u8>> {
        let end = self.rx_buf.iter().position(|&b| b == FRAME_DELIMITER)?;
        let mut frame: Vec<u8> = self.rx_buf.drain(..=end).collect();
        frame.pop();
        Some(frame)
    }
}

impl<L: SerialLink> PacketTransport for PacketStream<L> {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        let mut frame = cobs::encode(packet);
        frame.push(FRAME_DELIMITER);
        trace!(payload = packet.len(), frame = frame.len(), "TX packet");
        self.link.write_all(&frame)
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + self.timing.read_timeout;
        let mut chunk = [0u8; 512];

        let frame = loop {
            if let Some(frame) = self.take_frame() {
                break frame;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let n = if remaining.is_zero() {
                0
            } else {
                self.link.read(&mut chunk, remaining)?
            };
            if n == 0 {
                debug!(buffered = self.rx_buf.len(), "No frame terminator before timeout");
                self.rx_buf.clear();
                return Err(TransportError::Timeout {
                    timeout_ms: self.timing.read_timeout.as_millis() as u64,
                });
            }
            self.rx_buf.extend_from_slice(&chunk[..n]);
        };

        let packet = cobs::decode(&frame)?;
        trace!(payload = packet.len(), frame = frame.len(), "RX packet");
        Ok(packet)
    }

    #[instrument(skip(self))]
    fn reset(&mut self) -> Result<(), TransportError> {
        self.link.send_break(self.timing.break_duration)?;
        thread::sleep(self.timing.reset_settle);
        self.rx_buf.clear();

        // Empty packets flush any corrupt data out of the device's decoder
        for _ in 0..FLUSH_PACKETS {
            self.send(&[])?;
        }
        debug!("Link reset");
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        self.link.set_baud_rate(baud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CobsError;
    use crate::transport::MockLink;

    fn fast_timing() -> LinkTiming {
        LinkTiming {
            read_timeout: Duration::from_millis(10),
            break_duration: Duration::ZERO,
            reset_settle: Duration::ZERO,
        }
    }

    #[test]
    fn test_send_appends_terminator() {
        let mock = MockLink::default();
        let mut stream = PacketStream::with_timing(mock.clone(), fast_timing());
        stream.send(&[0x11, 0x22, 0x00, 0x33]).unwrap();
        assert_eq!(mock.written(), vec![0x03, 0x11, 0x22, 0x02, 0x33, 0x00]);
    }

    #[test]
    fn test_receive_packets_in_order() {
        let mock = MockLink::default();
        mock.queue_packet(b"first");
        mock.queue_packet(&[0x00, 0x00]);
        mock.queue_packet(b"");

        let mut stream = PacketStream::with_timing(mock, fast_timing());
        assert_eq!(stream.receive().unwrap(), b"first");
        assert_eq!(stream.receive().unwrap(), vec![0x00, 0x00]);
        assert_eq!(stream.receive().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_receive_timeout_without_terminator() {
        let mock = MockLink::default();
        mock.queue_bytes(&[0x03, b'o', b'k']);

        let mut stream = PacketStream::with_timing(mock, fast_timing());
        assert!(matches!(
            stream.receive(),
            Err(TransportError::Timeout { timeout_ms: 10 })
        ));
    }

    #[test]
    fn test_timeout_discards_partial_frame() {
        let mock = MockLink::default();
        mock.queue_bytes(&[0x02, b'4']);

        let mut stream = PacketStream::with_timing(mock.clone(), fast_timing());
        assert!(matches!(stream.receive(), Err(TransportError::Timeout { .. })));

        mock.queue_packet(b"ok");
        assert_eq!(stream.receive().unwrap(), b"ok");
    }

    #[test]
    fn test_receive_timeout_on_silence() {
        let mut stream = PacketStream::with_timing(MockLink::default(), fast_timing());
        let err = stream.receive().unwrap_err();
        assert!(err.is_link_error());
    }

    #[test]
    fn test_receive_malformed_frame() {
        let mock = MockLink::default();
        mock.queue_bytes(&[0x05, 0x11, 0x00]);

        let mut stream = PacketStream::with_timing(mock, fast_timing());
        assert!(matches!(
            stream.receive(),
            Err(TransportError::Framing(CobsError::LastOffsetMismatch { .. }))
        ));
    }

    #[test]
    fn test_large_packet_roundtrip() {
        let mock = MockLink::default();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        mock.queue_packet(&data);

        let mut stream = PacketStream::with_timing(mock, fast_timing());
        assert_eq!(stream.receive().unwrap(), data);
    }

    #[test]
    fn test_reset_breaks_and_flushes() {
        let mock = MockLink::default();
        mock.queue_bytes(&[0x02, 0x11]);

        let mut stream = PacketStream::with_timing(mock.clone(), fast_timing());
        // Pull the stale partial frame into the receive buffer
        assert!(stream.receive().is_err());
        stream.reset().unwrap();

        assert_eq!(mock.break_count(), 1);
        assert_eq!(mock.written(), vec![0x01, 0x00, 0x01, 0x00, 0x01, 0x00]);

        // Stale bytes are gone; a fresh packet decodes cleanly
        mock.queue_packet(b"42");
        assert_eq!(stream.receive().unwrap(), b"42");
    }

    #[test]
    fn test_set_baud_rate() {
        let mock = MockLink::new(9600);
        let mut stream = PacketStream::new(mock.clone());
        stream.set_baud_rate(115200).unwrap();
        assert_eq!(mock.baud_rate(), 115200);
        assert_eq!(stream.baud_rate(), 115200);
    }
}
