//! Top-level error type for device operations.

use thiserror::Error;

use crate::protocol::{CobsError, ProtocolError};
use crate::transport::TransportError;

/// Failure of a host operation.
///
/// A device that answers something other than `ok` is not an error: those
/// outcomes are returned as `bool`/`Option` values by the client.
#[derive(Error, Debug)]
pub enum ShieldError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Device not responding after reset: {0}")]
    DeviceNotResponding(#[source] Box<ShieldError>),
}

impl ShieldError {
    /// Timeouts and corrupt frames, typically cured by a lower baud rate.
    pub fn is_link_error(&self) -> bool {
        match self {
            ShieldError::Transport(e) => e.is_link_error(),
            ShieldError::DeviceNotResponding(inner) => inner.is_link_error(),
            ShieldError::Protocol(_) => false,
        }
    }
}

impl From<CobsError> for ShieldError {
    fn from(e: CobsError) -> Self {
        ShieldError::Transport(TransportError::Framing(e))
    }
}

pub type Result<T, E = ShieldError> = std::result::Result<T, E>;
