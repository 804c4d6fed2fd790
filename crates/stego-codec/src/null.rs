use stego_core::codec::{Cover, CoverFormat, StegoCodec, StegoMedium};
use stego_core::error::CodecError;

/// `embed` returns the message unchanged (the framer base64-encodes it
/// already, so the wire bytes remain safe to transport as an HTTP body);
/// `extract` is the identity function. Capacity is a large constant, not a
/// real steganographic limit.
pub struct NullCodec {
    capacity: usize,
}

impl NullCodec {
    /// Matches the original's `"null"` entry: `size: 5000000`.
    const DEFAULT_CAPACITY: usize = 5 * 1024 * 1024;

    pub fn new() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
        }
    }
}

impl Default for NullCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl StegoCodec for NullCodec {
    fn embed(&self, _cover: Option<&Cover>, message: &[u8]) -> Result<StegoMedium, CodecError> {
        if message.len() > self.capacity {
            return Err(CodecError::CapacityExceeded {
                message_len: message.len(),
                capacity: self.capacity,
            });
        }
        Ok(StegoMedium {
            format: CoverFormat::Raw,
            bytes: message.to_vec(),
        })
    }

    fn extract(&self, medium: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(medium.to_vec())
    }

    fn capacity(&self, _cover: Option<&Cover>) -> usize {
        self.capacity
    }

    fn cover_format(&self) -> Option<CoverFormat> {
        None
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
