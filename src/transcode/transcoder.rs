//! Size-budgeted JPEG transcoding: an iterative quality/dimension search
//! that converges on the requested byte budget without re-encoding more
//! than a bounded number of times.

use byte_unit::{Byte, UnitType};
use image::RgbImage;
use tracing::debug;

use super::codec;
use super::TranscodeError;

/// Knobs of the budget search. Quality never leaves `[quality_min,
/// quality_max]`, and at most `max_attempts` encodes run before the
/// forced-fit pass.
#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    pub quality_min: u8,
    pub quality_max: u8,
    pub max_attempts: u32,
    pub forced_fit_quality: u8,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            quality_min: 15,
            quality_max: 85,
            max_attempts: 8,
            forced_fit_quality: 25,
        }
    }
}

/// Quality is lowered in steps of this size until it reaches the floor;
/// after that only dimensions shrink.
const QUALITY_STEP: u8 = 15;

/// Raw-to-budget ratio beyond which dimensions are pre-scaled before the
/// first encode. JPEG rarely compresses photos past ~1:40 at acceptable
/// quality, so starting bigger only wastes attempts.
const PRESCALE_RATIO: f64 = 40.0;

/// Transcode `original` so the encoded output fits in `budget` bytes.
///
/// The final forced-fit pass computes dimensions directly from the achieved
/// ratio; it fits in practice but is best-effort, not a hard guarantee for
/// pathological inputs.
pub fn transcode_to_budget(
    original: &[u8],
    budget: u64,
    settings: &TranscodeSettings,
) -> Result<Vec<u8>, TranscodeError> {
    let decoded = codec::decode(original)?;
    let raw_size = decoded.width() as u64 * decoded.height() as u64 * 3;
    let ratio = raw_size as f64 / budget.max(1) as f64;

    let mut img: RgbImage = if ratio > PRESCALE_RATIO {
        codec::scale(&decoded, (PRESCALE_RATIO / ratio).sqrt())
    } else {
        decoded
    };
    let mut quality = initial_quality(ratio, settings);

    let mut produced = codec::encode_jpeg(&img, quality)?;
    let mut attempts = 1;

    while produced.len() as u64 > budget && attempts < settings.max_attempts.max(1) {
        if quality >= settings.quality_min.saturating_add(QUALITY_STEP) {
            quality = (quality - QUALITY_STEP).max(settings.quality_min);
        } else {
            // Near the quality floor: shrink instead. JPEG size tracks pixel
            // count roughly linearly, so sqrt of the byte ratio per axis,
            // nudged down to avoid landing just above the budget.
            let factor = ((budget as f64 / produced.len() as f64).sqrt() * 0.95).min(0.95);
            img = codec::scale(&img, factor);
        }
        produced = codec::encode_jpeg(&img, quality)?;
        attempts += 1;
    }

    if produced.len() as u64 > budget {
        // Forced fit: dimensions straight from the achieved ratio at a low
        // fixed quality.
        let factor = (budget as f64 / produced.len() as f64).sqrt() * 0.9;
        img = codec::scale(&img, factor);
        let forced_quality = settings
            .forced_fit_quality
            .clamp(settings.quality_min, settings.quality_max);
        produced = codec::encode_jpeg(&img, forced_quality)?;
        debug!(
            "Forced-fit pass: {} into budget {} after {} attempts",
            Byte::from_u64(produced.len() as u64).get_appropriate_unit(UnitType::Binary),
            Byte::from_u64(budget).get_appropriate_unit(UnitType::Binary),
            attempts,
        );
    }

    Ok(produced)
}

/// Starting quality from the raw-to-budget ratio: the tighter the budget,
/// the lower the first attempt starts.
fn initial_quality(ratio: f64, settings: &TranscodeSettings) -> u8 {
    let quality = if ratio <= 12.0 {
        settings.quality_max
    } else if ratio <= 24.0 {
        70
    } else if ratio <= PRESCALE_RATIO {
        60
    } else {
        50
    };
    quality.clamp(settings.quality_min, settings.quality_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::codec::testing::synthetic_photo;

    #[test]
    fn test_initial_quality_clamped_to_bounds() {
        let settings = TranscodeSettings {
            quality_min: 40,
            quality_max: 60,
            ..Default::default()
        };
        assert_eq!(initial_quality(1.0, &settings), 60);
        assert_eq!(initial_quality(100.0, &settings), 50);
        let tight = TranscodeSettings {
            quality_min: 55,
            quality_max: 60,
            ..Default::default()
        };
        assert_eq!(initial_quality(100.0, &tight), 55);
    }

    #[test]
    fn test_generous_budget_passes_through_first_encode() {
        let img = synthetic_photo(64, 64);
        let original = codec::encode_jpeg(&img, 85).unwrap();
        let settings = TranscodeSettings::default();
        let out = transcode_to_budget(&original, 10 * 1024 * 1024, &settings).unwrap();
        assert!(out.len() as u64 <= 10 * 1024 * 1024);
        // Generous budget keeps full dimensions.
        assert_eq!(codec::decode(&out).unwrap().dimensions(), (64, 64));
    }

    #[test]
    fn test_100kb_budget_met_for_large_source() {
        // A source whose direct encode is several hundred KB.
        let img = synthetic_photo(1600, 1200);
        let original = codec::encode_jpeg(&img, 90).unwrap();
        assert!(original.len() > 200 * 1024);

        let settings = TranscodeSettings::default();
        let budget = 100 * 1024;
        let out = transcode_to_budget(&original, budget, &settings).unwrap();
        assert!(
            out.len() as u64 <= budget,
            "produced {} bytes for a {} byte budget",
            out.len(),
            budget
        );
        // Still a decodable image.
        assert!(codec::decode(&out).is_ok());
    }

    #[test]
    fn test_tight_budget_met_via_dimension_scaling() {
        let img = synthetic_photo(1024, 768);
        let original = codec::encode_jpeg(&img, 90).unwrap();
        let settings = TranscodeSettings::default();
        let budget = 8 * 1024;
        let out = transcode_to_budget(&original, budget, &settings).unwrap();
        assert!(out.len() as u64 <= budget);
        let (w, h) = codec::decode(&out).unwrap().dimensions();
        assert!(w < 1024 && h < 768);
    }

    #[test]
    fn test_decode_error_propagates() {
        let settings = TranscodeSettings::default();
        assert!(matches!(
            transcode_to_budget(b"not an image", 100_000, &settings),
            Err(TranscodeError::Decode(_))
        ));
    }
}
