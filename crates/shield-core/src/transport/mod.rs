//! Transport layer module.

pub mod mock;
pub mod packet;
pub mod serial;
pub mod traits;

pub use mock::MockLink;
pub use packet::{LinkTiming, PacketStream, PacketTransport};
pub use serial::SerialportLink;
pub use traits::{SerialLink, TransportError};
