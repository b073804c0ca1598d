//! Device side of the simulated shield: command loop and remote file client.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use super::DeviceState;
use super::link::{DeviceBytes, LineSignal};
use crate::image;
use crate::protocol::constants::{
    FRAME_DELIMITER, IMAGE_CRC_FIELD, IMAGE_OVERHEAD, IMAGE_SIZE_FIELD, MAX_IMAGE_SIZE, SEEK_END,
    SEEK_SET,
};
use crate::protocol::{Command, CobsError, FileCommand, ProtocolError, Reply, cobs};

/// Why the device stopped waiting for a packet.
#[derive(Debug)]
enum Interrupt {
    /// Host hung up.
    HungUp,
    /// Break condition on the line.
    Break,
    /// Frame failed to decode.
    Framing(CobsError),
}

type Step<T> = Result<T, Interrupt>;

/// Device UART: COBS packets over the simulated line.
struct Uart {
    rx: Receiver<LineSignal>,
    tx: Sender<DeviceBytes>,
    buf: Vec<u8>,
    state: Arc<Mutex<DeviceState>>,
}

impl Uart {
    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, packet: &[u8]) {
        let mut frame = cobs::encode(packet);
        frame.push(FRAME_DELIMITER);
        let baud = self.state().baud;
        // Host gone: nothing left to do with the reply
        let _ = self.tx.send((frame, baud));
    }

    fn read(&mut self) -> Step<Vec<u8>> {
        loop {
            if let Some(end) = self.buf.iter().position(|&b| b == FRAME_DELIMITER) {
                let mut frame: Vec<u8> = self.buf.drain(..=end).collect();
                frame.pop();
                return cobs::decode(&frame).map_err(Interrupt::Framing);
            }

            match self.rx.recv() {
                Ok(LineSignal::Bytes(bytes, baud)) => {
                    let local = self.state().baud;
                    if baud == local {
                        self.buf.extend(bytes);
                    } else {
                        trace!(len = bytes.len(), baud, local, "Device dropped bytes at wrong baud");
                    }
                }
                Ok(LineSignal::Break) => {
                    self.buf.clear();
                    let mut state = self.state();
                    state.baud = state.initial_baud;
                    return Err(Interrupt::Break);
                }
                Err(_) => return Err(Interrupt::HungUp),
            }
        }
    }
}

/// Device end of the remote file protocol.
struct RemoteFile<'a> {
    uart: &'a mut Uart,
}

impl RemoteFile<'_> {
    fn int_reply(&mut self) -> Step<i64> {
        let reply = Reply::from_bytes(self.uart.read()?);
        Ok(reply.to_int("file").unwrap_or(-1))
    }

    fn read(&mut self, size: usize) -> Step<Vec<u8>> {
        self.uart.write(&FileCommand::Read { size }.to_packet());
        self.uart.read()
    }

    fn write(&mut self, data: &[u8]) -> Step<i64> {
        self.uart.write(&FileCommand::Write.to_packet());
        self.uart.write(data);
        self.int_reply()
    }

    fn seek(&mut self, offset: i64, origin: i64) -> Step<i64> {
        self.uart.write(&FileCommand::Seek { offset, origin }.to_packet());
        self.int_reply()
    }

    fn close(&mut self) -> Step<i64> {
        self.uart.write(&FileCommand::Close.to_packet());
        self.int_reply()
    }
}

/// Firmware main loop. Returns when the host hangs up.
pub(crate) fn run(rx: Receiver<LineSignal>, tx: Sender<DeviceBytes>, state: Arc<Mutex<DeviceState>>) {
    let mut uart = Uart {
        rx,
        tx,
        buf: Vec::new(),
        state,
    };

    loop {
        let packet = match uart.read() {
            Ok(packet) => packet,
            Err(Interrupt::HungUp) => return,
            Err(Interrupt::Break) => continue,
            Err(Interrupt::Framing(e)) => {
                debug!(error = %e, "Device framing error");
                uart.state().stats.encoding_errors += 1;
                continue;
            }
        };
        if packet.is_empty() {
            continue;
        }

        let command = match Command::parse(&packet) {
            Ok(command) => command,
            Err(ProtocolError::MalformedCommand { command, .. }) if command == "baud" => {
                uart.write(&Reply::error().into_bytes());
                continue;
            }
            Err(e) => {
                debug!(error = %e, "Device ignoring packet");
                uart.state().stats.unknown_commands += 1;
                continue;
            }
        };

        trace!(command = %command, "Device command");
        match handle(&mut uart, command) {
            Ok(()) => {}
            Err(Interrupt::HungUp) => return,
            Err(Interrupt::Break) => debug!(command = %command, "Command interrupted by break"),
            Err(Interrupt::Framing(e)) => {
                warn!(command = %command, error = %e, "Command aborted on framing error");
                uart.state().stats.encoding_errors += 1;
            }
        }
    }
}

fn status(uart: &Uart, success: bool) {
    let reply = if success { Reply::ok() } else { Reply::error() };
    uart.write(reply.as_bytes());
}

fn handle(uart: &mut Uart, command: Command) -> Step<()> {
    match command {
        Command::Version => {
            let version = uart.state().version;
            uart.write(Reply::int(version).as_bytes());
        }
        Command::Dump => {
            let image = uart.state().image.clone();
            let success = push_file(uart, &image)?;
            status(uart, success);
        }
        Command::DumpAll => {
            let flash = uart.state().flash();
            let success = push_file(uart, &flash)?;
            status(uart, success);
        }
        Command::Update => {
            let success = pull_update(uart)?;
            status(uart, success);
        }
        Command::Reload => {
            uart.state().reloads += 1;
            status(uart, true);
        }
        Command::Baud(baud) => {
            status(uart, true);
            uart.state().baud = baud;
            debug!(baud, "Device baud rate changed");
        }
        Command::Stats => {
            let stats = uart.state().stats;
            uart.write(stats.to_reply().as_bytes());
        }
    }
    Ok(())
}

/// Write `data` to a host file in device-sized chunks.
fn push_file(uart: &mut Uart, data: &[u8]) -> Step<bool> {
    let chunk_size = uart.state().chunk_size;
    let mut file = RemoteFile { uart: &mut *uart };

    let mut success = true;
    for chunk in data.chunks(chunk_size) {
        if file.write(chunk)? != chunk.len() as i64 {
            success = false;
            break;
        }
    }
    file.close()?;
    Ok(success)
}

/// Read a whole image from the host, validate it, and store it on success.
fn pull_update(uart: &mut Uart) -> Step<bool> {
    let chunk_size = uart.state().chunk_size;
    let mut file = RemoteFile { uart: &mut *uart };

    let len = file.seek(0, SEEK_END)?;
    file.seek(0, SEEK_SET)?;
    let received = receive_image(&mut file, len, chunk_size)?;
    file.close()?;

    let accepted = received.filter(|candidate| match image::validate(candidate) {
        Ok(payload) => {
            debug!(payload = payload.len(), "Update image accepted");
            true
        }
        Err(e) => {
            warn!(error = %e, "Update image rejected");
            false
        }
    });

    let mut state = uart.state();
    match accepted {
        Some(image) => {
            state.image = image;
            state.updates_accepted += 1;
            Ok(true)
        }
        None => {
            state.updates_rejected += 1;
            Ok(false)
        }
    }
}

/// Size field, payload chunks, CRC field. `None` when the file cannot hold a
/// well-formed image.
fn receive_image(file: &mut RemoteFile<'_>, len: i64, chunk_size: usize) -> Step<Option<Vec<u8>>> {
    let Ok(len) = usize::try_from(len) else {
        return Ok(None);
    };
    if len > MAX_IMAGE_SIZE {
        warn!(len, max = MAX_IMAGE_SIZE, "Update image too large");
        return Ok(None);
    }
    if len < IMAGE_OVERHEAD {
        warn!(len, "Update image too short");
        return Ok(None);
    }

    let mut image = file.read(IMAGE_SIZE_FIELD)?;
    let Some(declared) = image::declared_size(&image) else {
        return Ok(None);
    };
    if declared + IMAGE_OVERHEAD != len {
        warn!(declared, len, "Update size field does not match file");
        return Ok(None);
    }

    while image.len() < IMAGE_SIZE_FIELD + declared {
        let want = chunk_size.min(IMAGE_SIZE_FIELD + declared - image.len());
        let chunk = file.read(want)?;
        if chunk.is_empty() {
            return Ok(None);
        }
        image.extend_from_slice(&chunk);
    }
    image.extend(file.read(IMAGE_CRC_FIELD)?);
    Ok(Some(image))
}
