//! Consistent Overhead Byte Stuffing.
//!
//! Every zero in the input is replaced by the distance to the next zero (or
//! to the end of a 254-byte run), so an encoded frame never contains `0x00`
//! and the link can use a single zero byte as the frame terminator. The
//! terminator itself is appended by the transport, not by this module.
//!
//! An optional padding block can be requested so that a frame ending on an
//! exact 254-byte boundary still carries an explicit final overhead byte.

use thiserror::Error;

use super::constants::{COBS_BREAK_CODE, COBS_MAX_RUN};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CobsError {
    #[error("COBS decoding error: last offset wrong ({remaining} bytes unaccounted)")]
    LastOffsetMismatch { remaining: isize },

    #[error("COBS decoding error: required padding byte not present")]
    MissingPadding,
}

/// Encode `data` without the trailing padding block.
pub fn encode(data: &[u8]) -> Vec<u8> {
    encode_with(data, false)
}

/// Encode `data`, adding a padding block when the frame ends with a full run.
pub fn encode_padded(data: &[u8]) -> Vec<u8> {
    encode_with(data, true)
}

fn encode_with(data: &[u8], add_padding: bool) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(data.len() + data.len() / COBS_MAX_RUN + 2);
    encoded.push(0);
    let mut overhead = 0usize;
    let mut run = 0usize;

    for &byte in data {
        if run >= COBS_MAX_RUN {
            close_run(&mut encoded, &mut overhead, &mut run);
        }

        encoded.push(byte);
        run += 1;

        if byte == 0 {
            // The zero just pushed becomes the next overhead slot.
            encoded[overhead] = run as u8;
            overhead = encoded.len() - 1;
            run = 0;
        }
    }

    if add_padding && run >= COBS_MAX_RUN {
        close_run(&mut encoded, &mut overhead, &mut run);
    }

    encoded[overhead] = (run + 1) as u8;
    encoded
}

/// Insert a synthetic break after a full run of non-zero bytes.
fn close_run(encoded: &mut Vec<u8>, overhead: &mut usize, run: &mut usize) {
    encoded.push(0);
    *run += 1;
    encoded[*overhead] = *run as u8;
    *overhead = encoded.len() - 1;
    *run = 0;
}

/// Decode a frame (terminator already stripped).
pub fn decode(frame: &[u8]) -> Result<Vec<u8>, CobsError> {
    decode_with(frame, false)
}

/// Decode a frame that must end with the padding block.
pub fn decode_padded(frame: &[u8]) -> Result<Vec<u8>, CobsError> {
    decode_with(frame, true)
}

fn decode_with(frame: &[u8], require_padding: bool) -> Result<Vec<u8>, CobsError> {
    let mut decoded = Vec::with_capacity(frame.len());
    let mut next_zero: isize = 0;
    let mut next_pad = true;

    for &byte in frame {
        if next_zero == 0 {
            next_zero = byte as isize;
            if !next_pad {
                decoded.push(0);
            }
            next_pad = byte == COBS_BREAK_CODE;
        } else {
            decoded.push(byte);
        }
        next_zero -= 1;
    }

    if next_zero != 0 {
        return Err(CobsError::LastOffsetMismatch {
            remaining: next_zero,
        });
    }
    if require_padding && next_pad {
        return Err(CobsError::MissingPadding);
    }
    Ok(decoded)
}

/// Known-answer vectors, including the 254-byte run boundaries.
///
/// Source: <https://en.wikipedia.org/wiki/Consistent_Overhead_Byte_Stuffing>
pub fn reference_vectors() -> Vec<(Vec<u8>, Vec<u8>)> {
    vec![
        (vec![0x00], vec![0x01, 0x01]),
        (vec![0x00, 0x00], vec![0x01, 0x01, 0x01]),
        (
            vec![0x11, 0x22, 0x00, 0x33],
            vec![0x03, 0x11, 0x22, 0x02, 0x33],
        ),
        (
            vec![0x11, 0x22, 0x33, 0x44],
            vec![0x05, 0x11, 0x22, 0x33, 0x44],
        ),
        (
            vec![0x11, 0x00, 0x00, 0x00],
            vec![0x02, 0x11, 0x01, 0x01, 0x01],
        ),
        (seq(0x01, 0xFF), join(&[0xFF], &seq(0x01, 0xFF), &[])),
        (seq(0x00, 0xFF), join(&[0x01, 0xFF], &seq(0x01, 0xFF), &[])),
        (
            seq(0x01, 0x100),
            join(&[0xFF], &seq(0x01, 0xFF), &[0x02, 0xFF]),
        ),
        (
            join(&[], &seq(0x02, 0x100), &[0x00]),
            join(&[0xFF], &seq(0x02, 0x100), &[0x01, 0x01]),
        ),
        (
            join(&[], &seq(0x03, 0x100), &[0x00, 0x01]),
            join(&[0xFE], &seq(0x03, 0x100), &[0x02, 0x01]),
        ),
    ]
}

fn seq(lo: u16, hi: u16) -> Vec<u8> {
    (lo..hi).map(|b| b as u8).collect()
}

fn join(head: &[u8], body: &[u8], tail: &[u8]) -> Vec<u8> {
    [head, body, tail].concat()
}
