//! Thin wrappers around the `image` crate: decode, scale, JPEG-encode at a
//! given quality. The rest of the transcoder treats these as black boxes.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

use super::TranscodeError;

/// Scaling never goes below this edge length; a photo that small is already
/// a handful of bytes.
pub const MIN_DIMENSION: u32 = 16;

pub fn decode(bytes: &[u8]) -> Result<RgbImage, TranscodeError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| TranscodeError::Decode(e.to_string()))
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(img)
        .map_err(|e| TranscodeError::Encode(e.to_string()))?;
    Ok(out)
}

/// Scale both dimensions by `factor`, clamped to [`MIN_DIMENSION`].
pub fn scale(img: &RgbImage, factor: f64) -> RgbImage {
    let width = ((img.width() as f64 * factor).round() as u32).max(MIN_DIMENSION);
    let height = ((img.height() as f64 * factor).round() as u32).max(MIN_DIMENSION);
    image::imageops::resize(img, width, height, FilterType::Lanczos3)
}
