//! Command vocabulary.
//!
//! Two fixed sets of command words travel over the link as ASCII packets of
//! the form `word[,arg]*`:
//! - [`Command`]: sent by the host to the device.
//! - [`FileCommand`]: sent by the device to the host while a remote file
//!   transfer is in progress.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::constants::ARG_SEPARATOR;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid command \"{0}\"")]
    UnknownCommand(String),

    #[error("Malformed \"{command}\" command: {reason}")]
    MalformedCommand { command: String, reason: String },

    #[error("Unexpected reply to \"{command}\": {reply}")]
    UnexpectedReply { command: String, reply: String },
}

/// Split a packet into its command word and arguments.
fn split_packet(packet: &[u8]) -> (String, Vec<String>) {
    let mut fields = packet
        .split(|&b| b == ARG_SEPARATOR)
        .map(|f| String::from_utf8_lossy(f).into_owned());
    let word = fields.next().unwrap_or_default();
    (word, fields.collect())
}

fn expect_args(command: &str, args: &[String], count: usize) -> Result<(), ProtocolError> {
    if args.len() != count {
        return Err(ProtocolError::MalformedCommand {
            command: command.to_string(),
            reason: format!("expected {} argument(s), got {}", count, args.len()),
        });
    }
    Ok(())
}

fn parse_arg<T: FromStr>(command: &str, arg: &str) -> Result<T, ProtocolError> {
    arg.trim()
        .parse()
        .map_err(|_| ProtocolError::MalformedCommand {
            command: command.to_string(),
            reason: format!("invalid argument \"{}\"", arg),
        })
}

/// Host-to-device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Query the firmware version number.
    Version,
    /// Read back the stored firmware image.
    Dump,
    /// Read back the whole serial flash.
    DumpAll,
    /// Write a new firmware image.
    Update,
    /// Switch the device link to a new baud rate.
    Baud(u32),
    /// Force the FPGA to reload its image from flash.
    Reload,
    /// Query link error counters.
    Stats,
}

impl Command {
    pub fn word(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Dump => "dump",
            Command::DumpAll => "dump_all",
            Command::Update => "update",
            Command::Baud(_) => "baud",
            Command::Reload => "reload",
            Command::Stats => "stats",
        }
    }

    pub fn to_packet(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn parse(packet: &[u8]) -> Result<Self, ProtocolError> {
        let (word, args) = split_packet(packet);
        let command = match word.as_str() {
            "version" => Command::Version,
            "dump" => Command::Dump,
            "dump_all" => Command::DumpAll,
            "update" => Command::Update,
            "reload" => Command::Reload,
            "stats" => Command::Stats,
            "baud" => {
                expect_args(&word, &args, 1)?;
                return Ok(Command::Baud(parse_arg(&word, &args[0])?));
            }
            _ => return Err(ProtocolError::UnknownCommand(word)),
        };
        expect_args(&word, &args, 0)?;
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Baud(rate) => write!(f, "baud,{}", rate),
            other => write!(f, "{}", other.word()),
        }
    }
}

/// Device-to-host remote file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCommand {
    /// Return up to `size` bytes from the current position.
    Read { size: usize },
    /// The next packet holds data to store at the current position.
    Write,
    /// Move the position. `origin` is kept raw so unknown values can be
    /// answered with `-1` instead of failing the session.
    Seek { offset: i64, origin: i64 },
    /// End of transfer.
    Close,
}

impl FileCommand {
    pub fn word(&self) -> &'static str {
        match self {
            FileCommand::Read { .. } => "read",
            FileCommand::Write => "write",
            FileCommand::Seek { .. } => "seek",
            FileCommand::Close => "close",
        }
    }

    pub fn to_packet(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn parse(packet: &[u8]) -> Result<Self, ProtocolError> {
        let (word, args) = split_packet(packet);
        match word.as_str() {
            "read" => {
                expect_args(&word, &args, 1)?;
                Ok(FileCommand::Read {
                    size: parse_arg(&word, &args[0])?,
                })
            }
            "write" => {
                expect_args(&word, &args, 0)?;
                Ok(FileCommand::Write)
            }
            "seek" => {
                expect_args(&word, &args, 2)?;
                Ok(FileCommand::Seek {
                    offset: parse_arg(&word, &args[0])?,
                    origin: parse_arg(&word, &args[1])?,
                })
            }
            "close" => {
                expect_args(&word, &args, 0)?;
                Ok(FileCommand::Close)
            }
            _ => Err(ProtocolError::UnknownCommand(word)),
        }
    }
}

impl fmt::Display for FileCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileCommand::Read { size } => write!(f, "read,{}", size),
            FileCommand::Seek { offset, origin } => write!(f, "seek,{},{}", offset, origin),
            other => write!(f, "{}", other.word()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_words() {
        assert_eq!(Command::Version.to_packet(), b"version");
        assert_eq!(Command::DumpAll.to_packet(), b"dump_all");
        assert_eq!(Command::Baud(115200).to_packet(), b"baud,115200");
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(Command::parse(b"dump").unwrap(), Command::Dump);
        assert_eq!(Command::parse(b"baud,921600").unwrap(), Command::Baud(921600));
        assert_eq!(
            Command::parse(b"format"),
            Err(ProtocolError::UnknownCommand("format".into()))
        );
        assert!(matches!(
            Command::parse(b"baud"),
            Err(ProtocolError::MalformedCommand { .. })
        ));
        assert!(matches!(
            Command::parse(b"version,1"),
            Err(ProtocolError::MalformedCommand { .. })
        ));
    }

    #[test]
    fn test_parse_file_commands() {
        assert_eq!(
            FileCommand::parse(b"read,256").unwrap(),
            FileCommand::Read { size: 256 }
        );
        assert_eq!(FileCommand::parse(b"write").unwrap(), FileCommand::Write);
        assert_eq!(
            FileCommand::parse(b"seek,-4,2").unwrap(),
            FileCommand::Seek {
                offset: -4,
                origin: 2
            }
        );
        assert_eq!(FileCommand::parse(b"close").unwrap(), FileCommand::Close);
    }

    #[test]
    fn test_malformed_file_commands() {
        assert!(matches!(
            FileCommand::parse(b"read"),
            Err(ProtocolError::MalformedCommand { .. })
        ));
        assert!(matches!(
            FileCommand::parse(b"read,lots"),
            Err(ProtocolError::MalformedCommand { .. })
        ));
        assert!(matches!(
            FileCommand::parse(b"seek,1"),
            Err(ProtocolError::MalformedCommand { .. })
        ));
        assert!(matches!(
            FileCommand::parse(b"truncate,0"),
            Err(ProtocolError::UnknownCommand(_))
        ));
        assert!(matches!(
            FileCommand::parse(b""),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_file_command_display() {
        assert_eq!(FileCommand::Read { size: 4 }.to_string(), "read,4");
        assert_eq!(
            FileCommand::Seek {
                offset: 0,
                origin: 2
            }
            .to_packet(),
            b"seek,0,2"
        );
    }
}
