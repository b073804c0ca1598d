//! Remote file session: the host answers file operations issued by the device.
//!
//! ```text
//! AwaitCommand --read,<n>-----------> send data          --> AwaitCommand
//! AwaitCommand --write + <data>-----> send bytes written --> AwaitCommand
//! AwaitCommand --seek,<off>,<orig>--> send position      --> AwaitCommand
//! AwaitCommand --close--------------> send 0             --> Terminal
//! ```

use tracing::{debug, instrument, trace};

use super::state::RemoteFileState;
use crate::error::Result;
use crate::protocol::{FileCommand, Reply};
use crate::transport::PacketTransport;

/// Progress sink notified with `(position, total)`.
pub type Progress<'a> = &'a mut dyn FnMut(usize, usize);

/// One remote file transfer, driven entirely by the device.
pub struct RemoteFileSession<'a> {
    file: RemoteFileState,
    progress: Progress<'a>,
}

impl<'a> RemoteFileSession<'a> {
    pub fn new(data: Vec<u8>, progress: Progress<'a>) -> Self {
        Self {
            file: RemoteFileState::new(data),
            progress,
        }
    }

    /// Serve device requests until `close`, then hand back the file contents.
    ///
    /// Unknown or malformed commands abort the session.
    #[instrument(skip_all)]
    pub fn host<T: PacketTransport>(mut self, transport: &mut T) -> Result<Vec<u8>> {
        self.report();

        while !self.file.is_finished() {
            let packet = transport.receive()?;
            let command = FileCommand::parse(&packet)?;
            trace!(command = %command, "Remote file command");

            if let Some(reply) = self.dispatch(command, transport)? {
                transport.send(reply.as_bytes())?;
            }
        }

        debug!(len = self.file.len(), "Remote file closed");
        Ok(self.file.into_data())
    }

    fn dispatch<T: PacketTransport>(
        &mut self,
        command: FileCommand,
        transport: &mut T,
    ) -> Result<Option<Reply>> {
        match command {
            FileCommand::Read { size } => {
                let chunk = self.file.read(size).to_vec();
                self.report();
                transport.send(&chunk)?;
                Ok(None)
            }
            FileCommand::Write => {
                let chunk = transport.receive()?;
                let written = self.file.write(&chunk);
                self.report();
                Ok(Some(Reply::int(written as i64)))
            }
            FileCommand::Seek { offset, origin } => {
                Ok(Some(Reply::int(self.file.seek(offset, origin))))
            }
            FileCommand::Close => {
                let len = self.file.len();
                (self.progress)(len, len);
                self.file.close();
                Ok(Some(Reply::int(0)))
            }
        }
    }

    fn report(&mut self) {
        (self.progress)(self.file.position(), self.file.len());
    }
}

/// Serve one remote file transfer over `transport`.
pub fn host_file<T: PacketTransport>(
    transport: &mut T,
    data: Vec<u8>,
    progress: Progress<'_>,
) -> Result<Vec<u8>> {
    RemoteFileSession::new(data, progress).host(transport)
}
