//! Image preparation for the size-constrained vision call.
//!
//! Transport payloads embed pages as base64, which inflates bytes by 4/3.
//! Oversized photos are re-encoded as JPEG in a bounded shrink loop: scale
//! and quality both step down each attempt, so encoded size is non-increasing
//! and the loop terminates in a fixed number of steps. The loop never fails
//! outright — when every attempt stays above the target it returns the
//! smallest one obtained.

use image::imageops::FilterType;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

use crate::config::ImageConfig;
use crate::errors::ServiceError;

const SCALE_STEP: f32 = 0.85;
const QUALITY_START: u8 = 85;
const QUALITY_STEP: u8 = 7;
const QUALITY_FLOOR: u8 = 30;

/// Transport-ready page image.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

impl PreparedImage {
    /// Size after base64 inflation, the figure the ceiling applies to.
    pub fn encoded_len(&self) -> usize {
        base64_len(self.bytes.len())
    }
}

fn base64_len(raw: usize) -> usize {
    raw.div_ceil(3) * 4
}

/// File extension for a sniffed image payload, for storage paths.
pub fn extension_of(raw: &[u8]) -> Option<&'static str> {
    match image::guess_format(raw).ok()? {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Gif => Some("gif"),
        _ => None,
    }
}

fn media_type_of(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        _ => "application/octet-stream",
    }
}

#[derive(Debug)]
struct Attempt {
    bytes: Vec<u8>,
    scale: f32,
    quality: u8,
}

/// Run the bounded shrink loop, returning every attempt in order. Exposed at
/// module level so the termination and monotonicity contract is testable.
fn shrink_attempts(img: &DynamicImage, target_encoded: usize, max_attempts: u32) -> Vec<Attempt> {
    let (width, height) = (img.width(), img.height());
    let mut attempts = Vec::new();
    let mut scale = 1.0f32;
    let mut quality = QUALITY_START;

    for _ in 0..max_attempts {
        let w = ((width as f32 * scale) as u32).max(1);
        let h = ((height as f32 * scale) as u32).max(1);
        let resized = if scale < 1.0 {
            img.resize(w, h, FilterType::Triangle)
        } else {
            img.clone()
        };

        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        if rgb.write_with_encoder(encoder).is_ok() {
            let bytes = buf.into_inner();
            let done = base64_len(bytes.len()) <= target_encoded;
            attempts.push(Attempt {
                bytes,
                scale,
                quality,
            });
            if done {
                break;
            }
        }

        scale *= SCALE_STEP;
        quality = quality.saturating_sub(QUALITY_STEP).max(QUALITY_FLOOR);
    }

    attempts
}

/// Shrink `raw` below the transport ceiling.
///
/// Inputs already under the hard ceiling pass through unchanged with their
/// sniffed media type. Anything larger goes through the JPEG shrink loop
/// aimed at the safety-margin target.
pub fn prepare(raw: &[u8], limits: &ImageConfig) -> Result<PreparedImage, ServiceError> {
    let format = image::guess_format(raw)
        .map_err(|e| ServiceError::ValidationError(format!("unreadable image: {}", e)))?;

    if base64_len(raw.len()) <= limits.max_encoded_bytes {
        return Ok(PreparedImage {
            bytes: raw.to_vec(),
            media_type: media_type_of(format),
        });
    }

    let img = image::load_from_memory(raw)
        .map_err(|e| ServiceError::ValidationError(format!("undecodable image: {}", e)))?;

    let attempts = shrink_attempts(&img, limits.target_encoded_bytes, limits.max_attempts);

    // Smallest attempt wins even when none reached the target.
    let best = attempts
        .into_iter()
        .min_by_key(|a| a.bytes.len())
        .ok_or_else(|| ServiceError::InternalError("image re-encoding produced no output".into()))?;

    debug!(
        scale = best.scale,
        quality = best.quality,
        encoded = base64_len(best.bytes.len()),
        "image shrunk for transport"
    );

    Ok(PreparedImage {
        bytes: best.bytes,
        media_type: "image/jpeg",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn noisy_image(width: u32, height: u32) -> DynamicImage {
        // Deterministic high-frequency pattern; compresses poorly, which is
        // what the shrink loop exists for.
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 31 + y * 17) % 251) as u8;
            Rgb([v, v.wrapping_mul(7), v.wrapping_add(89)])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).expect("encode png");
        buf.into_inner()
    }

    #[test]
    fn small_images_pass_through_unchanged() {
        let raw = png_bytes(&noisy_image(40, 40));
        let limits = ImageConfig {
            max_encoded_bytes: 10 * 1024 * 1024,
            target_encoded_bytes: 9 * 1024 * 1024,
            max_attempts: 6,
        };
        let prepared = prepare(&raw, &limits).expect("prepare");
        assert_eq!(prepared.bytes, raw);
        assert_eq!(prepared.media_type, "image/png");
    }

    #[test]
    fn shrink_terminates_within_max_attempts_and_is_monotonic() {
        let img = noisy_image(600, 800);
        let attempts = shrink_attempts(&img, 1, 6);

        assert!(!attempts.is_empty());
        assert!(attempts.len() <= 6);
        for pair in attempts.windows(2) {
            assert!(
                pair[1].bytes.len() <= pair[0].bytes.len(),
                "attempt sizes must be non-increasing: {} then {}",
                pair[0].bytes.len(),
                pair[1].bytes.len()
            );
        }
    }

    #[test]
    fn oversized_image_lands_under_target() {
        let img = noisy_image(600, 800);
        let raw = png_bytes(&img);
        let target = base64_len(raw.len()) / 4;
        let limits = ImageConfig {
            max_encoded_bytes: target,
            target_encoded_bytes: target,
            max_attempts: 6,
        };
        let prepared = prepare(&raw, &limits).expect("prepare");
        assert_eq!(prepared.media_type, "image/jpeg");
        assert!(prepared.encoded_len() <= target);
    }

    #[test]
    fn impossible_target_still_returns_best_effort() {
        let raw = png_bytes(&noisy_image(300, 300));
        let limits = ImageConfig {
            max_encoded_bytes: 1,
            target_encoded_bytes: 1,
            max_attempts: 4,
        };
        // Never fails outright; smallest attempt comes back.
        let prepared = prepare(&raw, &limits).expect("prepare");
        assert!(!prepared.bytes.is_empty());
        assert!(prepared.bytes.len() < raw.len());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let limits = ImageConfig::default();
        assert!(prepare(b"not an image at all", &limits).is_err());
    }
}
