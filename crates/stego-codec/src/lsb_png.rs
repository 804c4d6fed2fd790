use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder};
use image::{ImageFormat, RgbImage};
use stego_core::codec::{Cover, CoverFormat, StegoCodec, StegoMedium};
use stego_core::error::CodecError;

/// Headroom reserved for the length prefix and rounding, matching the
/// original's `_calc_max_size`: `w * h * 3 / 8 - 1024`.
const HEADROOM: usize = 1024;
/// Big-endian byte count prefix preceding the embedded payload.
const LENGTH_PREFIX_BYTES: usize = 4;

/// Embeds one bit of the payload into the least-significant bit of each
/// successive R, G, B channel byte of the cover, in row-major order. A
/// 4-byte big-endian length prefix precedes the payload so extraction knows
/// exactly where to stop.
pub struct LsbPngCodec;

impl LsbPngCodec {
    pub fn new() -> Self {
        Self
    }

    fn capacity_for(width: u32, height: u32) -> usize {
        let bits = width as usize * height as usize * 3;
        (bits / 8).saturating_sub(HEADROOM)
    }
}

impl Default for LsbPngCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl StegoCodec for LsbPngCodec {
    fn embed(&self, cover: Option<&Cover>, message: &[u8]) -> Result<StegoMedium, CodecError> {
        let cover = cover.ok_or(CodecError::NoCover(CoverFormat::Png))?;
        let capacity = self.capacity(Some(cover));
        if message.len() > capacity {
            return Err(CodecError::CapacityExceeded {
                message_len: message.len(),
                capacity,
            });
        }

        let mut payload = Vec::with_capacity(LENGTH_PREFIX_BYTES + message.len());
        let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
        BigEndian::write_u32(&mut len_buf, message.len() as u32);
        payload.extend_from_slice(&len_buf);
        payload.extend_from_slice(message);

        // Private copy: the pooled cover's pixel data is never mutated.
        let mut rgb = cover.rgb.clone();
        let needed_channels = payload.len() * 8;
        if needed_channels > rgb.len() {
            return Err(CodecError::CapacityExceeded {
                message_len: message.len(),
                capacity,
            });
        }

        let mut channel = 0usize;
        for byte in &payload {
            for bit_index in (0..8).rev() {
                let bit = (byte >> bit_index) & 1;
                rgb[channel] = (rgb[channel] & 0b1111_1110) | bit;
                channel += 1;
            }
        }

        let image = RgbImage::from_raw(cover.width, cover.height, rgb)
            .ok_or_else(|| CodecError::Image("cover dimensions do not match pixel buffer".into()))?;
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| CodecError::Image(e.to_string()))?;

        Ok(StegoMedium {
            format: CoverFormat::Png,
            bytes: out.into_inner(),
        })
    }

    fn extract(&self, medium: &[u8]) -> Result<Vec<u8>, CodecError> {
        let decoded = image::load_from_memory_with_format(medium, ImageFormat::Png)
            .map_err(|e| CodecError::Corrupted(e.to_string()))?;
        let rgb = decoded.to_rgb8();
        let bytes = rgb.as_raw();

        let read_byte = |channel_offset: usize| -> Result<u8, CodecError> {
            let mut value = 0u8;
            for i in 0..8 {
                let channel = bytes
                    .get(channel_offset + i)
                    .ok_or_else(|| CodecError::Corrupted("medium too small for length prefix".into()))?;
                value = (value << 1) | (channel & 1);
            }
            Ok(value)
        };

        let mut len_bytes = [0u8; LENGTH_PREFIX_BYTES];
        for (i, slot) in len_bytes.iter_mut().enumerate() {
            *slot = read_byte(i * 8)?;
        }
        let len = BigEndian::read_u32(&len_bytes) as usize;

        let mut message = Vec::with_capacity(len);
        let payload_channel_start = LENGTH_PREFIX_BYTES * 8;
        for i in 0..len {
            message.push(read_byte(payload_channel_start + i * 8)?);
        }
        Ok(message)
    }

    fn capacity(&self, cover: Option<&Cover>) -> usize {
        cover.map_or(0, |c| Self::capacity_for(c.width, c.height))
    }

    fn cover_format(&self) -> Option<CoverFormat> {
        Some(CoverFormat::Png)
    }

    fn name(&self) -> &'static str {
        "lsb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cover(width: u32, height: u32) -> Cover {
        Cover::new(
            CoverFormat::Png,
            width,
            height,
            vec![0u8; (width * height * 3) as usize],
            Vec::new(),
        )
    }

    #[test]
    fn round_trips_within_capacity() {
        let codec = LsbPngCodec::new();
        let cover = test_cover(64, 64);
        let msg = b"covert payload";
        let medium = codec.embed(Some(&cover), msg).unwrap();
        assert_eq!(codec.extract(&medium.bytes).unwrap(), msg);
    }

    #[test]
    fn does_not_mutate_pooled_cover() {
        let codec = LsbPngCodec::new();
        let cover = test_cover(64, 64);
        let original = cover.rgb.clone();
        let _ = codec.embed(Some(&cover), b"x").unwrap();
        assert_eq!(cover.rgb, original);
    }

    #[test]
    fn rejects_message_past_capacity() {
        let codec = LsbPngCodec::new();
        let cover = test_cover(4, 4); // capacity saturates to 0
        assert!(codec.embed(Some(&cover), b"x").is_err());
    }
}
