//! Protocol module - link framing and command vocabulary.

pub mod cobs;
pub mod command;
pub mod constants;
pub mod reply;

pub use cobs::CobsError;
pub use command::{Command, FileCommand, ProtocolError};
pub use constants::*;
pub use reply::{DeviceStats, Reply};
