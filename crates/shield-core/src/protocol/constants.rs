//! Protocol constants for the FPGA CI test shield link.

// Serial link
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const INITIAL_BAUD_RATE: u32 = 9_600;
pub const READ_TIMEOUT_MS: u64 = 2_000;
pub const RESET_SETTLE_MS: u64 = 100;
pub const BAUD_SWITCH_DELAY_MS: u64 = 100;
pub const BREAK_DURATION_MS: u64 = 250;

/// Number of empty packets sent after a break to flush stale decoder state.
pub const FLUSH_PACKETS: usize = 3;

/// Frame terminator. Never appears inside an encoded frame.
pub const FRAME_DELIMITER: u8 = 0x00;

// COBS run bounds
pub const COBS_MAX_RUN: usize = 254;
pub const COBS_BREAK_CODE: u8 = 0xFF;

// Replies
pub const REPLY_OK: &[u8] = b"ok";
pub const REPLY_ERROR: &[u8] = b"error";

/// Separator between a command word and its arguments.
pub const ARG_SEPARATOR: u8 = b',';

// Firmware image wire format: [size: u32 LE][payload][crc32: u32 LE]
pub const IMAGE_SIZE_FIELD: usize = 4;
pub const IMAGE_CRC_FIELD: usize = 4;
pub const IMAGE_OVERHEAD: usize = IMAGE_SIZE_FIELD + IMAGE_CRC_FIELD;
/// Largest wire image the device accepts, header and footer included.
pub const MAX_IMAGE_SIZE: usize = 0x22_0000;

/// Chunk size the device uses when pulling/pushing remote file data.
pub const DEVICE_CHUNK_SIZE: usize = 256;

// Remote file seek origins
pub const SEEK_SET: i64 = 0;
pub const SEEK_CUR: i64 = 1;
pub const SEEK_END: i64 = 2;
