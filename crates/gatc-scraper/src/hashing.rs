//! Image normalization and content hashing.
//!
//! Captured creatives are normalized to RGBA PNG (optionally with the
//! transparent border trimmed) before hashing, so the same creative captured
//! twice yields the same SHA-256 and therefore the same asset.

use std::io::Cursor;

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::ImageError;

/// Alpha values at or below this are treated as background when trimming.
const TRIM_ALPHA_THRESHOLD: u8 = 100;

/// A normalized creative ready for storage.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Normalized PNG bytes.
    pub png: Vec<u8>,
    /// Lowercase hex SHA-256 of `png`.
    pub sha256: String,
    /// 64-bit average hash as 16 hex digits.
    pub phash: String,
    pub width: u32,
    pub height: u32,
}

/// Decodes `png`, normalizes it and computes its hashes.
pub fn normalize_and_hash(png: &[u8], trim: bool) -> Result<NormalizedImage, ImageError> {
    let _span = tracing::debug_span!("hashing.normalize").entered();

    let decoded =
        image::load_from_memory(png).map_err(|e| ImageError::Decode(e.to_string()))?;
    let mut rgba = decoded.to_rgba8();
    if trim {
        rgba = trim_border(rgba);
    }
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Empty);
    }

    let img = DynamicImage::ImageRgba8(rgba);
    let norm_png = encode_png(&img)?;
    let sha256 = sha256_hex(&norm_png);
    let phash = format!("{:016x}", average_hash(&img));

    Ok(NormalizedImage {
        png: norm_png,
        sha256,
        phash,
        width,
        height,
    })
}

/// Crops to the bounding box of pixels whose alpha exceeds the trim threshold.
/// Fully transparent images are returned unchanged.
fn trim_border(img: RgbaImage) -> RgbaImage {
    let (w, h) = img.dimensions();
    let mut bbox: Option<(u32, u32, u32, u32)> = None;

    for (x, y, px) in img.enumerate_pixels() {
        if px[3] <= TRIM_ALPHA_THRESHOLD {
            continue;
        }
        bbox = Some(match bbox {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    match bbox {
        Some((x0, y0, x1, y1)) if (x0, y0, x1, y1) != (0, 0, w - 1, h - 1) => {
            imageops::crop_imm(&img, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
        }
        _ => img,
    }
}

pub(crate) fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        Cursor::new(&mut out),
        CompressionType::Best,
        PngFilter::Adaptive,
    );
    img.write_with_encoder(encoder)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(out)
}

/// Average hash: grayscale, 8x8 Lanczos downscale, one bit per pixel brighter
/// than the mean, most significant bit first.
pub(crate) fn average_hash(img: &DynamicImage) -> u64 {
    let gray = img.to_luma8();
    let small = imageops::resize(&gray, 8, 8, FilterType::Lanczos3);
    let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p[0])).collect();
    let avg = pixels.iter().sum::<f64>() / pixels.len() as f64;

    pixels
        .iter()
        .fold(0u64, |acc, &p| (acc << 1) | u64::from(p > avg))
}

/// Number of differing bits between two 64-bit hashes.
pub fn hamming64(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Small deterministic hash used to split work across shards: the first
/// four bytes of the SHA-1 of `s`, big-endian. Shard assignment must not
/// change between releases, or a sharded deployment skips or repeats ads.
pub fn stable_int_hash(s: &str) -> u32 {
    let digest = Sha1::digest(s.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
