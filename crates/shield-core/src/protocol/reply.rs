//! Reply packet parsing.
//!
//! Replies are ASCII: decimal integers for numeric results, the literal `ok`
//! for success, anything else for failure.

use std::fmt;

use super::command::ProtocolError;
use super::constants::{REPLY_ERROR, REPLY_OK};

/// A decoded reply packet.
#[derive(Clone, PartialEq, Eq)]
pub struct Reply(Vec<u8>);

impl Reply {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn ok() -> Self {
        Self(REPLY_OK.to_vec())
    }

    pub fn error() -> Self {
        Self(REPLY_ERROR.to_vec())
    }

    pub fn int(value: i64) -> Self {
        Self(value.to_string().into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Literal `ok`, nothing more.
    pub fn is_ok(&self) -> bool {
        self.0 == REPLY_OK
    }

    /// Printable rendering for logs and error messages.
    pub fn as_ascii(&self) -> String {
        self.0
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }

    /// Parse a decimal integer reply to `command`.
    pub fn to_int(&self, command: &str) -> Result<i64, ProtocolError> {
        std::str::from_utf8(&self.0)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| ProtocolError::UnexpectedReply {
                command: command.to_string(),
                reply: self.as_ascii(),
            })
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reply({:?})", self.as_ascii())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ascii())
    }
}

/// Link error counters reported by the `stats` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub encoding_errors: u32,
    pub unknown_commands: u32,
}

impl DeviceStats {
    /// Parse `encoding_errors: <n>, unknown_commands <m>`.
    pub fn parse(reply: &Reply) -> Result<Self, ProtocolError> {
        let malformed = || ProtocolError::UnexpectedReply {
            command: "stats".into(),
            reply: reply.as_ascii(),
        };
        let text = std::str::from_utf8(reply.as_bytes()).map_err(|_| malformed())?;

        let mut encoding_errors = None;
        let mut unknown_commands = None;
        for field in text.split(',') {
            let mut parts = field.split(|c: char| c == ':' || c.is_whitespace());
            let key = parts.by_ref().find(|p| !p.is_empty());
            let value = parts.find(|p| !p.is_empty()).and_then(|v| v.parse().ok());
            match key {
                Some("encoding_errors") => encoding_errors = value,
                Some("unknown_commands") => unknown_commands = value,
                _ => return Err(malformed()),
            }
        }

        Ok(Self {
            encoding_errors: encoding_errors.ok_or_else(malformed)?,
            unknown_commands: unknown_commands.ok_or_else(malformed)?,
        })
    }

    pub fn to_reply(&self) -> Reply {
        Reply::from_bytes(
            format!(
                "encoding_errors: {}, unknown_commands {}",
                self.encoding_errors, self.unknown_commands
            )
            .into_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_reply() {
        assert!(Reply::from_bytes(b"ok".to_vec()).is_ok());
        assert!(!Reply::from_bytes(b"error".to_vec()).is_ok());
        assert!(!Reply::from_bytes(b"ok ".to_vec()).is_ok());
        assert!(!Reply::from_bytes(Vec::new()).is_ok());
    }

    #[test]
    fn test_int_reply() {
        assert_eq!(Reply::int(-1).to_int("seek").unwrap(), -1);
        assert_eq!(Reply::from_bytes(b"42".to_vec()).to_int("version").unwrap(), 42);
        assert!(matches!(
            Reply::from_bytes(b"ok".to_vec()).to_int("version"),
            Err(ProtocolError::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn test_ascii_rendering() {
        let reply = Reply::from_bytes(vec![b'o', 0x00, b'k', 0xFF]);
        assert_eq!(reply.as_ascii(), "o.k.");
    }

    #[test]
    fn test_stats_roundtrip() {
        let stats = DeviceStats {
            encoding_errors: 3,
            unknown_commands: 7,
        };
        let reply = stats.to_reply();
        assert_eq!(reply.as_bytes(), b"encoding_errors: 3, unknown_commands 7");
        assert_eq!(DeviceStats::parse(&reply).unwrap(), stats);
    }

    #[test]
    fn test_stats_malformed() {
        assert!(DeviceStats::parse(&Reply::from_bytes(b"encoding_errors: 3".to_vec())).is_err());
        assert!(DeviceStats::parse(&Reply::ok()).is_err());
    }
}
