use std::io;

use thiserror::Error;

use crate::codec::CoverFormat;

/// A socket error on any of the three links in a chain. Terminal for the
/// current chain; the `Connection` that raised it marks itself closed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed")]
    Closed,
    #[error("idle timeout")]
    IdleTimeout,
}

/// Malformed HTTP from either peer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("malformed status line")]
    MalformedStatusLine,
    #[error("malformed header block")]
    MalformedHeaders,
    #[error("incomplete message")]
    Incomplete,
    #[error("unsupported request scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("missing Host header")]
    MissingHost,
}

/// Codec failures: capacity exceeded on embed, or corrupted medium on extract.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message of {message_len} bytes exceeds cover capacity of {capacity} bytes")]
    CapacityExceeded { message_len: usize, capacity: usize },
    #[error("medium could not be decoded: {0}")]
    Corrupted(String),
    #[error("no cover available for format {0:?}")]
    NoCover(CoverFormat),
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cover image error: {0}")]
    Image(String),
}

/// Unknown algorithm, unreachable cover directory, and other fatal,
/// non-zero-exit startup failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown stego algorithm {0:?}")]
    UnknownAlgorithm(String),
    #[error("invalid address {0:?}: {1}")]
    InvalidAddress(String, String),
    #[error("cover directory {0:?} could not be read: {1}")]
    CoverDirUnreadable(String, io::Error),
    #[error("no cover images of format {0:?} found under {1:?}")]
    NoCoversForFormat(CoverFormat, String),
}

/// Top-level error a handler converts into an HTTP status at its boundary.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}
