//! Backing store of a remote file: an owned byte arena plus a roaming position.

use crate::protocol::constants::{SEEK_CUR, SEEK_END, SEEK_SET};

/// Reply to a seek with an unknown origin.
pub const SEEK_INVALID: i64 = -1;

/// Remote file contents and cursor.
///
/// The position always stays within `[0, len]`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteFileState {
    data: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl RemoteFileState {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            finished: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Take up to `size` bytes at the cursor. Over-reads are truncated.
    pub fn read(&mut self, size: usize) -> &[u8] {
        let start = self.pos;
        let end = start.saturating_add(size).min(self.data.len());
        self.pos = end;
        &self.data[start..end]
    }

    /// Store `chunk` at the cursor, overwriting and extending as needed.
    pub fn write(&mut self, chunk: &[u8]) -> usize {
        let end = (self.pos + chunk.len()).min(self.data.len());
        self.data.splice(self.pos..end, chunk.iter().copied());
        self.pos += chunk.len();
        chunk.len()
    }

    /// Move the cursor and return the new position, clamped into `[0, len]`.
    ///
    /// Origins: 0 absolute, 1 relative to the cursor, 2 relative to the end.
    /// Any other origin returns [`SEEK_INVALID`] and leaves the cursor alone.
    pub fn seek(&mut self, offset: i64, origin: i64) -> i64 {
        let base = match origin {
            SEEK_SET => 0,
            SEEK_CUR => self.pos as i64,
            SEEK_END => self.data.len() as i64,
            _ => return SEEK_INVALID,
        };
        let target = base.saturating_add(offset).clamp(0, self.data.len() as i64);
        self.pos = target as usize;
        target
    }

    /// Mark the transfer complete.
    pub fn close(&mut self) {
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_advances_and_truncates() {
        let mut file = RemoteFileState::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(file.read(2), &[1, 2]);
        assert_eq!(file.position(), 2);
        assert_eq!(file.read(10), &[3, 4, 5]);
        assert_eq!(file.position(), 5);
        assert!(file.read(4).is_empty());
        assert_eq!(file.position(), 5);
    }

    #[test]
    fn test_write_extends_empty_file() {
        let mut file = RemoteFileState::default();
        assert_eq!(file.write(b"abc"), 3);
        assert_eq!(file.write(b"def"), 3);
        assert_eq!(file.data(), b"abcdef");
        assert_eq!(file.position(), 6);
    }

    #[test]
    fn test_write_overwrites_then_extends() {
        let mut file = RemoteFileState::new(b"hello".to_vec());
        file.seek(3, SEEK_SET);
        file.write(b"p me");
        assert_eq!(file.data(), b"help me");
        assert_eq!(file.position(), 7);
    }

    #[test]
    fn test_write_inside() {
        let mut file = RemoteFileState::new(b"abcdef".to_vec());
        file.seek(1, SEEK_SET);
        file.write(b"XY");
        assert_eq!(file.data(), b"aXYdef");
        assert_eq!(file.position(), 3);
    }

    #[test]
    fn test_seek_origins() {
        let mut file = RemoteFileState::new(vec![0; 100]);
        assert_eq!(file.seek(10, SEEK_SET), 10);
        assert_eq!(file.seek(5, SEEK_CUR), 15);
        assert_eq!(file.seek(-5, SEEK_CUR), 10);
        assert_eq!(file.seek(-20, SEEK_END), 80);
        assert_eq!(file.seek(0, SEEK_END), 100);
    }

    #[test]
    fn test_seek_clamps() {
        let mut file = RemoteFileState::new(vec![0; 100]);
        assert_eq!(file.seek(-1, SEEK_SET), 0);
        assert_eq!(file.seek(-50, SEEK_CUR), 0);
        assert_eq!(file.seek(101, SEEK_SET), 100);
        assert_eq!(file.seek(10, SEEK_END), 100);
        assert_eq!(file.seek(i64::MAX, SEEK_CUR), 100);
        assert_eq!(file.position(), 100);
    }

    #[test]
    fn test_seek_unknown_origin() {
        let mut file = RemoteFileState::new(vec![0; 100]);
        file.seek(42, SEEK_SET);
        assert_eq!(file.seek(0, 3), SEEK_INVALID);
        assert_eq!(file.seek(0, -1), SEEK_INVALID);
        assert_eq!(file.position(), 42);
    }

    #[test]
    fn test_close() {
        let mut file = RemoteFileState::new(vec![7; 3]);
        assert!(!file.is_finished());
        file.close();
        assert!(file.is_finished());
        assert_eq!(file.into_data(), vec![7; 3]);
    }
}
