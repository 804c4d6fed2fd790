use std::fs;
use std::path::Path;

use stego_core::codec::{Cover, CoverFormat, CoverPool};
use stego_core::config::Algorithm;
use stego_core::error::ConfigError;
use tracing::{debug, warn};

/// Walks `dir` non-recursively, decoding every `.png`/`.jpg`/`.jpeg` file it
/// finds into a [`Cover`] and adding it to a fresh [`CoverPool`]. Files that
/// fail to decode are skipped with a warning rather than aborting the load —
/// one bad cover image shouldn't take the whole pool down.
pub fn load_cover_pool(dir: &Path) -> Result<CoverPool, ConfigError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ConfigError::CoverDirUnreadable(dir.display().to_string(), e))?;
    let mut pool = CoverPool::new();

    for entry in entries {
        let entry = entry
            .map_err(|e| ConfigError::CoverDirUnreadable(dir.display().to_string(), e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match load_cover(&path) {
            Ok(Some(cover)) => {
                debug!(path = %path.display(), format = %cover.format, "loaded cover image");
                pool.insert(cover);
            }
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable cover image"),
        }
    }

    Ok(pool)
}

/// Ensures `pool` has at least one cover of the format `algorithm` requires,
/// returning [`ConfigError::NoCoversForFormat`] if not. The null algorithm
/// needs no covers and always passes.
pub fn ensure_required_covers(
    pool: &CoverPool,
    algorithm: Algorithm,
    cover_dir: &Path,
) -> Result<(), ConfigError> {
    match algorithm.required_cover_format() {
        Some(format) if !pool.has_format(format) => Err(ConfigError::NoCoversForFormat(
            format,
            cover_dir.display().to_string(),
        )),
        _ => Ok(()),
    }
}

fn load_cover(path: &Path) -> Result<Option<Cover>, image::ImageError> {
    let format = match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
        Some(ext) if ext == "png" => CoverFormat::Png,
        Some(ext) if ext == "jpg" || ext == "jpeg" => CoverFormat::Jpeg,
        _ => return Ok(None),
    };

    let encoded = fs::read(path).map_err(image::ImageError::IoError)?;
    let decoded = image::load_from_memory(&encoded)?;
    let rgb = decoded.to_rgb8();
    let (width, height) = (rgb.width(), rgb.height());

    Ok(Some(Cover::new(format, width, height, rgb.into_raw(), encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn write_png(dir: &Path, name: &str) {
        let img = RgbImage::new(8, 8);
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        fs::write(dir.join(name), bytes.into_inner()).unwrap();
    }

    #[test]
    fn loads_png_covers_into_pool() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        write_png(dir.path(), "b.png");

        let pool = load_cover_pool(dir.path()).unwrap();
        assert_eq!(pool.count(CoverFormat::Png), 2);
        assert!(pool.has_format(CoverFormat::Png));
        assert!(!pool.has_format(CoverFormat::Jpeg));
    }

    #[test]
    fn ensure_required_covers_rejects_empty_pool_for_lsb() {
        let pool = CoverPool::new();
        let dir = Path::new("/tmp/covers");
        assert!(ensure_required_covers(&pool, Algorithm::Lsb, dir).is_err());
        assert!(ensure_required_covers(&pool, Algorithm::Null, dir).is_ok());
    }

    #[test]
    fn unreadable_directory_is_an_error() {
        assert!(load_cover_pool(Path::new("/no/such/directory")).is_err());
    }
}
