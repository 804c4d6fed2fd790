use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use std::io::Read;
use stego_core::codec::{Cover, CoverFormat, StegoCodec, StegoMedium};
use stego_core::error::CodecError;

const EXIF_ID: &[u8] = b"Exif\0\0";
const APP1_MARKER: u16 = 0xFFE1;
const SOI_MARKER: u16 = 0xFFD8;
const SOS_MARKER: u16 = 0xFFDA;
const IMAGE_DESCRIPTION_TAG: u16 = 0x010E;
const UNDEFINED_TYPE: u16 = 7;

/// `embed` zlib-compresses the message, stores it in the EXIF
/// `ImageDescription` tag of a synthesized APP1 segment, and splices that
/// segment right after the JPEG SOI marker (replacing any pre-existing
/// APP1 segment). `extract` reverses the splice and decompresses.
pub struct ExifJpegCodec;

/// The EXIF segment limit: a JPEG marker segment's 2-byte length field caps
/// it at 65535 bytes including the length field itself, and this codec's
/// declared capacity uses that ceiling directly (matching the original's
/// "Don't change me!" `size: 65536` entry).
const CAPACITY: usize = 65536;

impl ExifJpegCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExifJpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl StegoCodec for ExifJpegCodec {
    fn embed(&self, cover: Option<&Cover>, message: &[u8]) -> Result<StegoMedium, CodecError> {
        let cover = cover.ok_or(CodecError::NoCover(CoverFormat::Jpeg))?;
        let capacity = self.capacity(Some(cover));
        if message.len() > capacity {
            return Err(CodecError::CapacityExceeded {
                message_len: message.len(),
                capacity,
            });
        }

        let mut encoder = ZlibEncoder::new(message, Compression::default());
        let mut compressed = Vec::new();
        encoder
            .read_to_end(&mut compressed)
            .map_err(|e| CodecError::Image(e.to_string()))?;

        let segment = build_app1_segment(&compressed)?;
        let stripped = strip_app1_segments(&cover.encoded)?;
        let mut out = Vec::with_capacity(stripped.len() + segment.len());
        out.extend_from_slice(&stripped[..2]); // SOI
        out.extend_from_slice(&segment);
        out.extend_from_slice(&stripped[2..]);

        Ok(StegoMedium {
            format: CoverFormat::Jpeg,
            bytes: out,
        })
    }

    fn extract(&self, medium: &[u8]) -> Result<Vec<u8>, CodecError> {
        let compressed = find_image_description(medium)?;
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut message = Vec::new();
        decoder
            .read_to_end(&mut message)
            .map_err(|e| CodecError::Corrupted(e.to_string()))?;
        Ok(message)
    }

    fn capacity(&self, _cover: Option<&Cover>) -> usize {
        CAPACITY
    }

    fn cover_format(&self) -> Option<CoverFormat> {
        Some(CoverFormat::Jpeg)
    }

    fn name(&self) -> &'static str {
        "exif"
    }
}

/// Builds a complete APP1 marker segment (marker + length + `Exif\0\0` +
/// a one-entry TIFF IFD0 pointing the `ImageDescription` tag at `payload`).
fn build_app1_segment(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    const TIFF_HEADER_LEN: usize = 8;
    const IFD0_LEN: usize = 2 + 12 + 4; // entry count + one entry + next-IFD offset
    let value_offset = (TIFF_HEADER_LEN + IFD0_LEN) as u32;

    let mut body = Vec::with_capacity(TIFF_HEADER_LEN + IFD0_LEN + payload.len());
    // TIFF header: "II" (little-endian), magic 42, IFD0 offset.
    body.extend_from_slice(b"II");
    let mut buf2 = [0u8; 2];
    LittleEndian::write_u16(&mut buf2, 42);
    body.extend_from_slice(&buf2);
    let mut buf4 = [0u8; 4];
    LittleEndian::write_u32(&mut buf4, TIFF_HEADER_LEN as u32);
    body.extend_from_slice(&buf4);

    // IFD0: one entry.
    LittleEndian::write_u16(&mut buf2, 1);
    body.extend_from_slice(&buf2);
    LittleEndian::write_u16(&mut buf2, IMAGE_DESCRIPTION_TAG);
    body.extend_from_slice(&buf2);
    LittleEndian::write_u16(&mut buf2, UNDEFINED_TYPE);
    body.extend_from_slice(&buf2);
    LittleEndian::write_u32(&mut buf4, payload.len() as u32);
    body.extend_from_slice(&buf4);
    LittleEndian::write_u32(&mut buf4, value_offset);
    body.extend_from_slice(&buf4);
    // Next IFD offset: none.
    LittleEndian::write_u32(&mut buf4, 0);
    body.extend_from_slice(&buf4);

    body.extend_from_slice(payload);

    let segment_len = 2 + EXIF_ID.len() + body.len();
    if segment_len > u16::MAX as usize {
        return Err(CodecError::CapacityExceeded {
            message_len: payload.len(),
            capacity: CAPACITY,
        });
    }

    let mut segment = Vec::with_capacity(2 + segment_len);
    let mut marker_buf = [0u8; 2];
    BigEndian::write_u16(&mut marker_buf, APP1_MARKER);
    segment.extend_from_slice(&marker_buf);
    let mut len_buf = [0u8; 2];
    BigEndian::write_u16(&mut len_buf, segment_len as u16);
    segment.extend_from_slice(&len_buf);
    segment.extend_from_slice(EXIF_ID);
    segment.extend_from_slice(&body);
    Ok(segment)
}

/// Returns a copy of `jpeg` with every existing APP1 segment removed
/// (SOI and everything from the first non-APP1 segment onward is kept
/// verbatim).
fn strip_app1_segments(jpeg: &[u8]) -> Result<Vec<u8>, CodecError> {
    if jpeg.len() < 2 || BigEndian::read_u16(&jpeg[0..2]) != SOI_MARKER {
        return Err(CodecError::Corrupted("not a JPEG: missing SOI".into()));
    }
    let mut out = Vec::with_capacity(jpeg.len());
    out.extend_from_slice(&jpeg[0..2]);
    let mut pos = 2;

    while pos + 1 < jpeg.len() {
        let marker = BigEndian::read_u16(&jpeg[pos..pos + 2]);
        if marker == SOS_MARKER {
            // Entropy-coded scan data follows; copy the rest verbatim.
            out.extend_from_slice(&jpeg[pos..]);
            return Ok(out);
        }
        if !(0xFF00..=0xFFFF).contains(&marker) {
            return Err(CodecError::Corrupted("malformed JPEG marker".into()));
        }
        let seg_len = BigEndian::read_u16(&jpeg[pos + 2..pos + 4]) as usize;
        let seg_end = pos + 2 + seg_len;
        if seg_end > jpeg.len() {
            return Err(CodecError::Corrupted("truncated JPEG segment".into()));
        }
        if marker != APP1_MARKER {
            out.extend_from_slice(&jpeg[pos..seg_end]);
        }
        pos = seg_end;
    }
    Ok(out)
}

/// Locates our APP1/EXIF segment in `jpeg` and returns the compressed bytes
/// stored at the `ImageDescription` tag's offset.
fn find_image_description(jpeg: &[u8]) -> Result<Vec<u8>, CodecError> {
    if jpeg.len() < 2 || BigEndian::read_u16(&jpeg[0..2]) != SOI_MARKER {
        return Err(CodecError::Corrupted("not a JPEG: missing SOI".into()));
    }
    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        let marker = BigEndian::read_u16(&jpeg[pos..pos + 2]);
        if marker == SOS_MARKER {
            break;
        }
        if !(0xFF00..=0xFFFF).contains(&marker) {
            return Err(CodecError::Corrupted("malformed JPEG marker".into()));
        }
        let seg_len = BigEndian::read_u16(&jpeg[pos + 2..pos + 4]) as usize;
        let seg_end = pos + 2 + seg_len;
        if seg_end > jpeg.len() {
            return Err(CodecError::Corrupted("truncated JPEG segment".into()));
        }
        if marker == APP1_MARKER {
            let body_start = pos + 4;
            let body = &jpeg[body_start..seg_end];
            if let Some(tiff) = body.strip_prefix(EXIF_ID) {
                return parse_image_description(tiff);
            }
        }
        pos = seg_end;
    }
    Err(CodecError::Corrupted("no EXIF ImageDescription tag found".into()))
}

fn parse_image_description(tiff: &[u8]) -> Result<Vec<u8>, CodecError> {
    let err = || CodecError::Corrupted("malformed EXIF TIFF structure".into());
    if tiff.len() < 8 || &tiff[0..2] != b"II" {
        return Err(err());
    }
    let ifd0_offset = LittleEndian::read_u32(&tiff[4..8]) as usize;
    if tiff.len() < ifd0_offset + 2 {
        return Err(err());
    }
    let entry_count = LittleEndian::read_u16(&tiff[ifd0_offset..ifd0_offset + 2]) as usize;
    let entries_start = ifd0_offset + 2;

    for i in 0..entry_count {
        let entry_start = entries_start + i * 12;
        if tiff.len() < entry_start + 12 {
            return Err(err());
        }
        let tag = LittleEndian::read_u16(&tiff[entry_start..entry_start + 2]);
        if tag != IMAGE_DESCRIPTION_TAG {
            continue;
        }
        let count = LittleEndian::read_u32(&tiff[entry_start + 4..entry_start + 8]) as usize;
        let value_offset = LittleEndian::read_u32(&tiff[entry_start + 8..entry_start + 12]) as usize;
        let data = tiff
            .get(value_offset..value_offset + count)
            .ok_or_else(err)?;
        return Ok(data.to_vec());
    }
    Err(CodecError::Corrupted("no EXIF ImageDescription tag found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_jpeg() -> Vec<u8> {
        // SOI, then a single SOS marker with no scan data, then EOI.
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]); // SOS, len=2 (no payload)
        bytes.extend_from_slice(&[0xFF, 0xD9]); // EOI
        bytes
    }

    fn test_cover() -> Cover {
        Cover::new(CoverFormat::Jpeg, 16, 16, Vec::new(), minimal_jpeg())
    }

    #[test]
    fn round_trips() {
        let codec = ExifJpegCodec::new();
        let cover = test_cover();
        let msg = b"a covert message riding along in EXIF";
        let medium = codec.embed(Some(&cover), msg).unwrap();
        assert_eq!(codec.extract(&medium.bytes).unwrap(), msg);
    }

    #[test]
    fn replacing_embed_drops_previous_segment() {
        let codec = ExifJpegCodec::new();
        let cover = test_cover();
        let first = codec.embed(Some(&cover), b"first").unwrap();
        let second_cover = Cover::new(CoverFormat::Jpeg, 16, 16, Vec::new(), first.bytes);
        let second = codec.embed(Some(&second_cover), b"second").unwrap();
        assert_eq!(codec.extract(&second.bytes).unwrap(), b"second");
    }

    #[test]
    fn corrupted_medium_fails_to_extract() {
        let codec = ExifJpegCodec::new();
        assert!(codec.extract(b"not a jpeg at all").is_err());
    }
}
