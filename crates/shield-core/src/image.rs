//! Firmware image wire format.
//!
//! ```text
//! [size: u32 LE][payload: size bytes][crc32(payload): u32 LE]
//! ```
//!
//! The host only builds images. Acceptance is decided by the device, which
//! recomputes both fields; [`validate`] is that device-side check and is used
//! by the simulator.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::protocol::constants::{IMAGE_CRC_FIELD, IMAGE_OVERHEAD, IMAGE_SIZE_FIELD, MAX_IMAGE_SIZE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image too short: {actual} bytes, minimum {minimum}")]
    TooShort { actual: usize, minimum: usize },

    #[error("Image too large: {actual} bytes, maximum {maximum}")]
    TooLarge { actual: usize, maximum: usize },

    #[error("Size field mismatch: declared {declared} bytes, payload has {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("CRC mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    CrcMismatch { expected: u32, actual: u32 },
}

/// CRC-32 (IEEE) of `payload`.
pub fn crc32(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Wrap `payload` with its length and CRC-32.
pub fn build_image(payload: &[u8]) -> Vec<u8> {
    build_image_with(payload, 0, 0)
}

/// Build an image whose size and CRC fields are skewed by the given deltas.
///
/// Deltas of zero yield a well-formed image. Both fields wrap at 32 bits.
pub fn build_image_with(payload: &[u8], size_delta: i64, crc_delta: i64) -> Vec<u8> {
    let size = (payload.len() as i64).wrapping_add(size_delta) as u32;
    let crc = (crc32(payload) as i64).wrapping_add(crc_delta) as u32;

    let mut image = vec![0u8; payload.len() + IMAGE_OVERHEAD];
    LittleEndian::write_u32(&mut image[..IMAGE_SIZE_FIELD], size);
    image[IMAGE_SIZE_FIELD..IMAGE_SIZE_FIELD + payload.len()].copy_from_slice(payload);
    LittleEndian::write_u32(&mut image[IMAGE_SIZE_FIELD + payload.len()..], crc);
    image
}

/// Declared payload size of a wire image, if the header is present.
pub fn declared_size(image: &[u8]) -> Option<usize> {
    (image.len() >= IMAGE_SIZE_FIELD).then(|| LittleEndian::read_u32(image) as usize)
}

/// Check a received wire image and return its payload.
pub fn validate(image: &[u8]) -> Result<&[u8], ImageError> {
    if image.len() < IMAGE_OVERHEAD {
        return Err(ImageError::TooShort {
            actual: image.len(),
            minimum: IMAGE_OVERHEAD,
        });
    }
    if image.len() > MAX_IMAGE_SIZE {
        return Err(ImageError::TooLarge {
            actual: image.len(),
            maximum: MAX_IMAGE_SIZE,
        });
    }

    let declared = LittleEndian::read_u32(image) as usize;
    let actual = image.len() - IMAGE_OVERHEAD;
    if declared != actual {
        return Err(ImageError::SizeMismatch { declared, actual });
    }

    let payload = &image[IMAGE_SIZE_FIELD..IMAGE_SIZE_FIELD + actual];
    let expected = LittleEndian::read_u32(&image[image.len() - IMAGE_CRC_FIELD..]);
    let computed = crc32(payload);
    if expected != computed {
        return Err(ImageError::CrcMismatch {
            expected,
            actual: computed,
        });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let image = build_image(b"123456789");
        assert_eq!(image.len(), 9 + IMAGE_OVERHEAD);
        assert_eq!(&image[..4], &[9, 0, 0, 0]);
        assert_eq!(&image[4..13], b"123456789");
        // CRC-32 check value
        assert_eq!(&image[13..], &0xCBF4_3926u32.to_le_bytes());
    }

    #[test]
    fn test_empty_payload() {
        let image = build_image(&[]);
        assert_eq!(image, vec![0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(validate(&image).unwrap(), b"");
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let payload: Vec<u8> = (0..=255).collect();
        let image = build_image(&payload);
        assert_eq!(validate(&image).unwrap(), payload.as_slice());
        assert_eq!(declared_size(&image), Some(256));
    }

    #[test]
    fn test_zero_deltas_match_build_image() {
        let payload = [0xAAu8; 1024];
        assert_eq!(build_image_with(&payload, 0, 0), build_image(&payload));
    }

    #[test]
    fn test_bad_crc_rejected() {
        let image = build_image_with(&[0x5A; 1024], 0, 1);
        assert!(matches!(validate(&image), Err(ImageError::CrcMismatch { .. })));
    }

    #[test]
    fn test_every_crc_bit_flip_rejected() {
        let image = build_image(&[1, 2, 3, 4, 5]);
        let crc_start = image.len() - IMAGE_CRC_FIELD;
        for bit in 0..32 {
            let mut corrupted = image.clone();
            corrupted[crc_start + bit / 8] ^= 1 << (bit % 8);
            assert!(validate(&corrupted).is_err(), "bit {} accepted", bit);
        }
    }

    #[test]
    fn test_bad_size_rejected() {
        let payload = [0x33u8; 1024];
        assert_eq!(
            validate(&build_image_with(&payload, 1, 0)),
            Err(ImageError::SizeMismatch {
                declared: 1025,
                actual: 1024
            })
        );
        assert!(matches!(
            validate(&build_image_with(&payload, -1, 0)),
            Err(ImageError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_size_limit() {
        let max = vec![0u8; MAX_IMAGE_SIZE - IMAGE_OVERHEAD];
        assert!(validate(&build_image(&max)).is_ok());

        let over = vec![0u8; MAX_IMAGE_SIZE - IMAGE_OVERHEAD + 1];
        assert!(matches!(
            validate(&build_image(&over)),
            Err(ImageError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_truncated_rejected() {
        assert!(matches!(
            validate(&[0, 0, 0]),
            Err(ImageError::TooShort { .. })
        ));
    }
}
