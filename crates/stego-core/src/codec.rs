//! The pluggable steganography interface. Concrete algorithms (null, LSB-PNG,
//! EXIF-JPEG) live in the `stego-codec` crate and implement [`StegoCodec`]
//! against the [`Cover`]/[`CoverPool`] types defined here.

use std::collections::HashMap;
use std::fmt;

use crate::error::CodecError;

/// Image container format a cover is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverFormat {
    Png,
    Jpeg,
    /// Tag used by codecs with no image container, such as the null codec.
    Raw,
}

impl fmt::Display for CoverFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Raw => "raw",
        })
    }
}

/// A source image used as a carrier for hidden bytes, decoded once at
/// startup and held read-only in the [`CoverPool`].
#[derive(Debug, Clone)]
pub struct Cover {
    pub format: CoverFormat,
    pub width: u32,
    pub height: u32,
    /// Raw, tightly-packed RGB8 pixel data, row-major, top-to-bottom.
    /// Used by pixel-domain codecs such as LSB-PNG.
    pub rgb: Vec<u8>,
    /// The cover's original encoded container bytes (e.g. the source JPEG
    /// file), used by container-domain codecs such as EXIF-JPEG that splice
    /// a segment into the existing file rather than re-deriving it from
    /// pixels.
    pub encoded: Vec<u8>,
}

impl Cover {
    pub fn new(format: CoverFormat, width: u32, height: u32, rgb: Vec<u8>, encoded: Vec<u8>) -> Self {
        debug_assert_eq!(rgb.len(), width as usize * height as usize * 3);
        Self {
            format,
            width,
            height,
            rgb,
            encoded,
        }
    }
}

/// The cover after a message has been embedded into it — the artifact sent
/// on the wire.
#[derive(Debug, Clone)]
pub struct StegoMedium {
    pub format: CoverFormat,
    pub bytes: Vec<u8>,
}

/// A pair of functions that embed bytes into a cover and extract them back,
/// with a declared capacity. Implementations MUST treat `cover` as
/// read-only, cloning whatever internal state they mutate.
pub trait StegoCodec: Send + Sync {
    /// Embeds `message` into a private copy of `cover`, returning the
    /// resulting medium bytes. Fails with [`CodecError::CapacityExceeded`]
    /// if `message.len()` exceeds `self.capacity(cover)`. `cover` is `None`
    /// for codecs that declare no [`cover_format`](Self::cover_format), such
    /// as the null codec.
    fn embed(&self, cover: Option<&Cover>, message: &[u8]) -> Result<StegoMedium, CodecError>;

    /// Recovers the message previously embedded into `medium`.
    fn extract(&self, medium: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Bytes of plaintext `cover` can carry.
    fn capacity(&self, cover: Option<&Cover>) -> usize;

    /// The cover format this codec's covers must be encoded in, or `None`
    /// if it needs no cover image at all.
    fn cover_format(&self) -> Option<CoverFormat>;

    /// Short identifier used in CLI flags and log lines ("null", "lsb", "exif").
    fn name(&self) -> &'static str;
}

/// The read-only, in-memory set of decoded cover images loaded once at
/// startup, grouped by format. Every `embed` call clones the `Cover` it
/// draws from here before mutating pixel or EXIF data — the pool itself is
/// never mutated.
#[derive(Debug, Clone, Default)]
pub struct CoverPool {
    by_format: HashMap<CoverFormat, Vec<Cover>>,
}

impl CoverPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cover: Cover) {
        self.by_format.entry(cover.format).or_default().push(cover);
    }

    /// Returns a cover of the given format, round-robining across the pool
    /// on successive calls with the same `call_index` sequence. Mirrors the
    /// original's `cfg.COVER_OBJECTS[0]` behavior when only one cover is
    /// loaded, and spreads load when more are present.
    pub fn pick(&self, format: CoverFormat, call_index: usize) -> Option<&Cover> {
        let covers = self.by_format.get(&format)?;
        if covers.is_empty() {
            return None;
        }
        Some(&covers[call_index % covers.len()])
    }

    pub fn has_format(&self, format: CoverFormat) -> bool {
        self.by_format
            .get(&format)
            .is_some_and(|covers| !covers.is_empty())
    }

    pub fn count(&self, format: CoverFormat) -> usize {
        self.by_format.get(&format).map_or(0, Vec::len)
    }
}
