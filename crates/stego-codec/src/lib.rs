pub mod exif_jpeg;
pub mod loader;
pub mod lsb_png;
pub mod null;

use stego_core::codec::StegoCodec;
use stego_core::config::Algorithm;

/// Constructs the concrete codec a configured [`Algorithm`] names.
pub fn codec_for(algorithm: Algorithm) -> Box<dyn StegoCodec> {
    match algorithm {
        Algorithm::Null => Box::new(null::NullCodec::new()),
        Algorithm::Lsb => Box::new(lsb_png::LsbPngCodec::new()),
        Algorithm::Exif => Box::new(exif_jpeg::ExifJpegCodec::new()),
    }
}
