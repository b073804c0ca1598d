//! Device command client.
//!
//! One method per command word. Simple commands are a single request/reply
//! exchange; `dump`, `dump_all` and `update` hand the link to a remote file
//! session and then read one final status packet.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ShieldError};
use crate::events::{
    LogLevel, PacketDirection, ShieldEvent, ShieldObserver, ShieldPhase, TracingObserver,
};
use crate::protocol::constants::BAUD_SWITCH_DELAY_MS;
use crate::protocol::{Command, DeviceStats, Reply};
use crate::remote_file::{Progress, host_file};
use crate::transport::{PacketTransport, TransportError};

/// Client for the FPGA CI test shield command protocol.
pub struct ShieldClient<T: PacketTransport, O: ShieldObserver = TracingObserver> {
    transport: T,
    observer: Arc<O>,
    baud_switch_delay: Duration,
    phase: ShieldPhase,
}

impl<T: PacketTransport> ShieldClient<T, TracingObserver> {
    /// Create a client with the default tracing observer.
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver))
    }
}

impl<T: PacketTransport, O: ShieldObserver> ShieldClient<T, O> {
    /// Create a client with a custom observer.
    pub fn with_observer(transport: T, observer: Arc<O>) -> Self {
        Self {
            transport,
            observer,
            baud_switch_delay: Duration::from_millis(BAUD_SWITCH_DELAY_MS),
            phase: ShieldPhase::Idle,
        }
    }

    /// Pause between the device's baud acknowledgment and the local switch.
    pub fn with_baud_switch_delay(mut self, delay: Duration) -> Self {
        self.baud_switch_delay = delay;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn phase(&self) -> ShieldPhase {
        self.phase
    }

    fn emit(&self, event: ShieldEvent) {
        self.observer.on_event(&event);
    }

    fn set_phase(&mut self, to: ShieldPhase) {
        if self.phase != to {
            self.emit(ShieldEvent::PhaseChanged {
                from: self.phase,
                to,
            });
            self.phase = to;
        }
    }

    /// Run `body` in `phase`, returning to idle whatever the outcome.
    fn in_phase<R>(
        &mut self,
        phase: ShieldPhase,
        body: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.set_phase(phase);
        let result = body(self);
        self.set_phase(ShieldPhase::Idle);
        result
    }

    /// Emit the outcome of an `ok`-or-not status reply.
    fn check_status(&self, command: Command, status: &Reply) -> bool {
        if status.is_ok() {
            self.emit(ShieldEvent::Complete {
                command: command.word().to_string(),
            });
            true
        } else {
            self.emit(ShieldEvent::Rejected {
                command: command.word().to_string(),
                reply: status.as_ascii(),
            });
            false
        }
    }

    /// Send a command and read its single reply.
    fn exchange(&mut self, command: Command) -> Result<Reply> {
        let observer = Arc::clone(&self.observer);
        let mut link = ObservableTransport {
            inner: &mut self.transport,
            observer: observer.as_ref(),
        };
        link.send(&command.to_packet())?;
        Ok(Reply::from_bytes(link.receive()?))
    }

    /// Send a transfer command, serve the remote file, read the final status.
    fn transfer(
        &mut self,
        command: Command,
        phase: ShieldPhase,
        data: Vec<u8>,
        progress: Progress<'_>,
    ) -> Result<(Vec<u8>, Reply)> {
        self.in_phase(phase, |client| {
            let observer = Arc::clone(&client.observer);
            let mut link = ObservableTransport {
                inner: &mut client.transport,
                observer: observer.as_ref(),
            };
            link.send(&command.to_packet())?;

            let mut report = |position: usize, total: usize| {
                observer.on_event(&ShieldEvent::Progress {
                    phase,
                    position,
                    total,
                });
                progress(position, total);
            };
            let data = host_file(&mut link, data, &mut report)?;
            let status = Reply::from_bytes(link.receive()?);
            Ok((data, status))
        })
    }

    /// Break the link, flush it, and confirm the device answers `version`.
    ///
    /// Returns the firmware version. A device that does not answer is fatal.
    #[instrument(skip(self))]
    pub fn reset(&mut self) -> Result<i64> {
        self.in_phase(ShieldPhase::Reset, |client| {
            client.transport.reset()?;

            let version = client
                .version()
                .map_err(|e| ShieldError::DeviceNotResponding(Box::new(e)))?;
            client.emit(ShieldEvent::DeviceResponding { version });
            Ok(version)
        })
    }

    /// Firmware version number.
    pub fn version(&mut self) -> Result<i64> {
        let reply = self.exchange(Command::Version)?;
        let version = reply.to_int(Command::Version.word())?;
        debug!(version, "Version reply");
        Ok(version)
    }

    /// Read back the stored firmware image. `None` if the device reports failure.
    #[instrument(skip(self, progress))]
    pub fn dump(&mut self, progress: Progress<'_>) -> Result<Option<Vec<u8>>> {
        let (data, status) = self.transfer(Command::Dump, ShieldPhase::Dump, Vec::new(), progress)?;
        Ok(self.check_status(Command::Dump, &status).then_some(data))
    }

    /// Read back the whole serial flash. `None` if the device reports failure.
    #[instrument(skip(self, progress))]
    pub fn dump_all(&mut self, progress: Progress<'_>) -> Result<Option<Vec<u8>>> {
        let (data, status) =
            self.transfer(Command::DumpAll, ShieldPhase::DumpAll, Vec::new(), progress)?;
        Ok(self.check_status(Command::DumpAll, &status).then_some(data))
    }

    /// Send a firmware image. `false` if the device rejected it.
    ///
    /// The image is sent as-is; size and CRC checks are left to the device.
    #[instrument(skip(self, image, progress), fields(len = image.len()))]
    pub fn update(&mut self, image: &[u8], progress: Progress<'_>) -> Result<bool> {
        let (_, status) =
            self.transfer(Command::Update, ShieldPhase::Update, image.to_vec(), progress)?;
        let accepted = self.check_status(Command::Update, &status);
        if accepted {
            info!("Update accepted");
        } else {
            warn!(reply = %status, "Update rejected");
        }
        Ok(accepted)
    }

    /// Switch both ends of the link to `baud`.
    ///
    /// The local rate only changes after the device acknowledges.
    #[instrument(skip(self))]
    pub fn baud(&mut self, baud: u32) -> Result<bool> {
        self.in_phase(ShieldPhase::BaudChange, |client| {
            let command = Command::Baud(baud);
            let reply = client.exchange(command)?;
            let acknowledged = client.check_status(command, &reply);

            if acknowledged {
                // Give the device time to switch first
                thread::sleep(client.baud_switch_delay);
                client.transport.set_baud_rate(baud)?;
                client.emit(ShieldEvent::Log {
                    level: LogLevel::Info,
                    message: format!("Link running at {baud} baud"),
                });
            }
            Ok(acknowledged)
        })
    }

    /// Force the FPGA to reload its image from flash.
    #[instrument(skip(self))]
    pub fn reload(&mut self) -> Result<bool> {
        self.in_phase(ShieldPhase::Reload, |client| {
            let reply = client.exchange(Command::Reload)?;
            Ok(client.check_status(Command::Reload, &reply))
        })
    }

    /// Device link error counters.
    pub fn stats(&mut self) -> Result<DeviceStats> {
        let reply = self.exchange(Command::Stats)?;
        Ok(DeviceStats::parse(&reply)?)
    }
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: PacketTransport, O: ShieldObserver> {
    inner: &'a mut T,
    observer: &'a O,
}

impl<T: PacketTransport, O: ShieldObserver> ObservableTransport<'_, T, O> {
    fn packet_event(&self, direction: PacketDirection, data: &[u8]) {
        self.observer.on_event(&ShieldEvent::Packet {
            direction,
            length: data.len(),
            data: Some(data.iter().take(32).copied().collect()),
        });
    }
}

impl<T: PacketTransport, O: ShieldObserver> PacketTransport for ObservableTransport<'_, T, O> {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        self.inner.send(packet)?;
        self.packet_event(PacketDirection::Tx, packet);
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let packet = self.inner.receive()?;
        self.packet_event(PacketDirection::Rx, &packet);
        Ok(packet)
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.inner.reset()
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), TransportError> {
        self.inner.set_baud_rate(baud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingObserver;
    use crate::protocol::ProtocolError;
    use crate::transport::{LinkTiming, MockLink, PacketStream, SerialLink};

    fn client(mock: &MockLink) -> ShieldClient<PacketStream<MockLink>, RecordingObserver> {
        let stream = PacketStream::with_timing(
            mock.clone(),
            LinkTiming {
                read_timeout: Duration::from_millis(10),
                break_duration: Duration::ZERO,
                reset_settle: Duration::ZERO,
            },
        );
        ShieldClient::with_observer(stream, Arc::new(RecordingObserver::default()))
            .with_baud_switch_delay(Duration::ZERO)
    }

    #[test]
    fn test_version() {
        let mock = MockLink::default();
        mock.queue_packet(b"3");
        let mut client = client(&mock);
        assert_eq!(client.version().unwrap(), 3);
        assert_eq!(mock.sent_packets(), vec![b"version".to_vec()]);
    }

    #[test]
    fn test_version_garbage_reply() {
        let mock = MockLink::default();
        mock.queue_packet(b"v3");
        let mut client = client(&mock);
        assert!(matches!(
            client.version(),
            Err(ShieldError::Protocol(ProtocolError::UnexpectedReply { .. }))
        ));
    }

    #[test]
    fn test_reset_sequence() {
        let mock = MockLink::default();
        mock.queue_packet(b"7");
        let mut client = client(&mock);

        assert_eq!(client.reset().unwrap(), 7);
        assert_eq!(mock.break_count(), 1);
        assert_eq!(
            mock.sent_packets(),
            vec![Vec::new(), Vec::new(), Vec::new(), b"version".to_vec()]
        );
        assert_eq!(client.phase(), ShieldPhase::Idle);
    }

    #[test]
    fn test_reset_silent_device_is_fatal() {
        let mock = MockLink::default();
        let mut client = client(&mock);
        let err = client.reset().unwrap_err();
        assert!(matches!(err, ShieldError::DeviceNotResponding(_)));
        assert!(err.is_link_error());
    }

    #[test]
    fn test_baud_switches_after_ack() {
        let mock = MockLink::new(9600);
        mock.queue_packet(b"ok");
        let mut client = client(&mock);

        assert!(client.baud(115200).unwrap());
        assert_eq!(mock.sent_packets(), vec![b"baud,115200".to_vec()]);
        assert_eq!(mock.baud_rate(), 115200);
    }

    #[test]
    fn test_baud_refused_keeps_rate() {
        let mock = MockLink::new(9600);
        mock.queue_packet(b"error");
        let mut client = client(&mock);

        assert!(!client.baud(115200).unwrap());
        assert_eq!(mock.baud_rate(), 9600);
    }

    #[test]
    fn test_reload() {
        let mock = MockLink::default();
        mock.queue_packet(b"ok");
        mock.queue_packet(b"busy");
        let mut client = client(&mock);
        assert!(client.reload().unwrap());
        assert!(!client.reload().unwrap());
    }

    #[test]
    fn test_stats() {
        let mock = MockLink::default();
        mock.queue_packet(b"encoding_errors: 2, unknown_commands 5");
        let mut client = client(&mock);
        assert_eq!(
            client.stats().unwrap(),
            DeviceStats {
                encoding_errors: 2,
                unknown_commands: 5
            }
        );
    }

    #[test]
    fn test_dump_success() {
        let mock = MockLink::default();
        mock.queue_packet(b"write");
        mock.queue_packet(b"\x04\x00\x00\x00");
        mock.queue_packet(b"close");
        mock.queue_packet(b"ok");
        let mut client = client(&mock);

        let data = client.dump(&mut |_, _| {}).unwrap();
        assert_eq!(data, Some(vec![4, 0, 0, 0]));
        assert_eq!(
            mock.sent_packets(),
            vec![b"dump".to_vec(), b"4".to_vec(), b"0".to_vec()]
        );
    }

    #[test]
    fn test_dump_all_failure_is_none() {
        let mock = MockLink::default();
        mock.queue_packet(b"close");
        mock.queue_packet(b"error");
        let mut client = client(&mock);
        assert_eq!(client.dump_all(&mut |_, _| {}).unwrap(), None);
        assert_eq!(mock.sent_packets()[0], b"dump_all");
    }

    #[test]
    fn test_update_rejected_is_value() {
        let mock = MockLink::default();
        mock.queue_packet(b"read,256");
        mock.queue_packet(b"close");
        mock.queue_packet(b"error");
        let mut client = client(&mock);

        let accepted = client.update(&[1, 2, 3], &mut |_, _| {}).unwrap();
        assert!(!accepted);
        assert_eq!(
            mock.sent_packets(),
            vec![b"update".to_vec(), vec![1, 2, 3], b"0".to_vec()]
        );

        let events = client.observer.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            ShieldEvent::Rejected { command, .. } if command == "update"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ShieldEvent::Progress { phase: ShieldPhase::Update, position: 3, total: 3 }
        )));
    }

    #[test]
    fn test_update_protocol_error_propagates() {
        let mock = MockLink::default();
        mock.queue_packet(b"erase");
        let mut client = client(&mock);
        assert!(matches!(
            client.update(&[0; 8], &mut |_, _| {}),
            Err(ShieldError::Protocol(ProtocolError::UnknownCommand(_)))
        ));
        assert_eq!(client.phase(), ShieldPhase::Idle);

        let events = client.observer.events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(ShieldEvent::PhaseChanged { from: ShieldPhase::Update, to: ShieldPhase::Idle })
        ));
    }

    #[test]
    fn test_failed_commands_return_to_idle() {
        let mock = MockLink::default();
        let mut client = client(&mock);

        assert!(client.reset().is_err());
        assert_eq!(client.phase(), ShieldPhase::Idle);
        assert!(client.baud(115200).is_err());
        assert_eq!(client.phase(), ShieldPhase::Idle);
        assert!(client.reload().is_err());
        assert_eq!(client.phase(), ShieldPhase::Idle);
    }

    #[test]
    fn test_timed_out_reply_does_not_leak() {
        let mock = MockLink::default();
        mock.queue_bytes(&[0x02, b'4']);
        let mut client = client(&mock);
        assert!(client.version().unwrap_err().is_link_error());

        mock.queue_packet(b"ok");
        assert!(client.reload().unwrap());
    }
}
