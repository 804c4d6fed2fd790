use std::net::SocketAddr;
use std::path::PathBuf;

use crate::codec::CoverFormat;
use crate::error::ConfigError;

/// Which concrete [`StegoCodec`](crate::codec::StegoCodec) to use. Selected
/// by CLI flag, resolved to an implementation by `stego-codec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Null,
    Lsb,
    Exif,
}

impl Algorithm {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "lsb" => Ok(Self::Lsb),
            "exif" => Ok(Self::Exif),
            other => Err(ConfigError::UnknownAlgorithm(other.to_string())),
        }
    }

    /// The cover format the chosen algorithm requires, or `None` for the
    /// null codec, which needs no cover at all.
    pub fn required_cover_format(self) -> Option<CoverFormat> {
        match self {
            Self::Null => None,
            Self::Lsb => Some(CoverFormat::Png),
            Self::Exif => Some(CoverFormat::Jpeg),
        }
    }
}

/// Process-wide settings, built once at startup and shared read-only
/// (`Arc<Config>`) with every handler. Never mutated after construction —
/// the replacement for the source's global `cfg` module object (SPEC_FULL.md
/// §9, "Global mutable config").
#[derive(Debug, Clone)]
pub struct Config {
    /// Address this proxy role listens on.
    pub listen_addr: SocketAddr,
    /// Stego-server address (client role only).
    pub remote_addr: Option<SocketAddr>,
    pub algorithm: Algorithm,
    pub cover_dir: PathBuf,
    /// Ceiling on a single covert HTTP chunk's plaintext size; also the
    /// threshold above which a message is chunked rather than sent whole.
    pub max_content_length: usize,
    /// Decoy host the stego-server imitates for non-covert GETs (server
    /// role only).
    pub reverse_hostname: Option<String>,
}

impl Config {
    /// Validates that the cover directory exists (when the chosen algorithm
    /// needs covers at all); the caller is responsible for populating and
    /// checking the `CoverPool` built from it once I/O is performed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.algorithm.required_cover_format().is_some() && !self.cover_dir.is_dir() {
            return Err(ConfigError::CoverDirUnreadable(
                self.cover_dir.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        Ok(())
    }
}

/// Parses a `"host:port"` string into a [`SocketAddr`], resolving DNS names
/// via the standard library.
pub fn parse_socket_addr(s: &str) -> Result<SocketAddr, ConfigError> {
    use std::net::ToSocketAddrs;
    s.to_socket_addrs()
        .map_err(|e| ConfigError::InvalidAddress(s.to_string(), e.to_string()))?
        .next()
        .ok_or_else(|| ConfigError::InvalidAddress(s.to_string(), "no addresses resolved".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!(matches!(
            Algorithm::parse("rot13"),
            Err(ConfigError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn null_algorithm_needs_no_cover_format() {
        assert_eq!(Algorithm::parse("null").unwrap().required_cover_format(), None);
    }

    #[test]
    fn missing_cover_dir_fails_validation_for_lsb() {
        let cfg = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            remote_addr: None,
            algorithm: Algorithm::Lsb,
            cover_dir: PathBuf::from("/does/not/exist/ever"),
            max_content_length: 65536,
            reverse_hostname: None,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn existing_cover_dir_passes_validation_for_lsb() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            remote_addr: None,
            algorithm: Algorithm::Lsb,
            cover_dir: dir.path().to_path_buf(),
            max_content_length: 65536,
            reverse_hostname: None,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn null_algorithm_ignores_a_missing_cover_dir() {
        let cfg = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            remote_addr: None,
            algorithm: Algorithm::Null,
            cover_dir: PathBuf::from("/does/not/exist/ever"),
            max_content_length: 65536,
            reverse_hostname: None,
        };
        assert!(cfg.validate().is_ok());
    }
}
