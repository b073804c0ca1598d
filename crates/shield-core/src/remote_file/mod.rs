//! Remote file sub-protocol.
//!
//! While a `dump`, `dump_all` or `update` is in progress the device owns the
//! link and issues `read`/`write`/`seek`/`close` requests; the host answers
//! them from an in-memory buffer.

pub mod session;
pub mod state;

pub use session::{Progress, RemoteFileSession, host_file};
pub use state::{RemoteFileState, SEEK_INVALID};
