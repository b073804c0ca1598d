//! Shield-Core: host-side protocol stack for the FPGA CI test shield.
//!
//! The shield is only reachable through a serial link. This crate turns that
//! byte stream into framed packets, layers the command protocol and the
//! remote file transfer sub-protocol on top, and uses them to read, write and
//! verify the shield's firmware image.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: COBS codec, command words, replies, constants
//! - **Transport**: serial link abstraction (serialport, mock) and packet framing
//! - **Remote File**: device-driven read/write/seek/close over packets
//! - **Client**: one method per device command
//! - **Image**: size + payload + CRC-32 firmware wire format
//! - **Events**: Observer pattern for UI decoupling
//! - **Matrix**: directed update test matrix and codec self-test
//! - **Sim**: simulated shield for running the stack without hardware
//!
//! # Example
//!
//! ```no_run
//! use shield_core::client::ShieldClient;
//! use shield_core::transport::{PacketStream, SerialportLink};
//!
//! let link = SerialportLink::open("/dev/ttyACM0", 9600)?;
//! let mut client = ShieldClient::new(PacketStream::new(link));
//!
//! client.reset()?;
//! client.baud(115200)?;
//! let firmware = client.dump(&mut |pos: usize, total: usize| println!("{pos}/{total}"))?;
//! # Ok::<(), shield_core::ShieldError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod image;
pub mod matrix;
pub mod protocol;
pub mod remote_file;
pub mod sim;
pub mod transport;

// Re-exports for convenience
pub use client::ShieldClient;
pub use config::ShieldConfig;
pub use error::{Result, ShieldError};
pub use events::{LogLevel, ShieldEvent, ShieldObserver, ShieldPhase, TracingObserver};
pub use image::{ImageError, build_image, validate};
pub use matrix::{MatrixEvent, MatrixReport, TestCase, cobs_self_test, run_matrix, update_matrix};
pub use protocol::{CobsError, Command, DeviceStats, FileCommand, ProtocolError, Reply};
pub use sim::{SimLink, SimulatedShield};
pub use transport::{PacketStream, PacketTransport, SerialLink, SerialportLink, TransportError};
