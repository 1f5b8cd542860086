//! Picks the settled frame of an animated creative.
//!
//! Animated creatives usually end on their call to action, so the frame kept
//! is the last one that stayed visually unchanged for a minimum window, not
//! the first frame the decoder yields.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat};

use crate::error::ImageError;
use crate::hashing::{average_hash, encode_png, hamming64};

/// Frames beyond this are not decoded.
const MAX_FRAMES: usize = 600;

/// Browsers play zero-delay GIF frames at roughly this rate.
const ZERO_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleParams {
    /// Samples after this point of the timeline are ignored.
    pub max_wait_ms: u64,
    /// How long a frame must stay unchanged to count as settled.
    pub min_stable_ms: u64,
    /// Warm-up before a stable frame is accepted without a prior change.
    pub min_observe_ms: u64,
    /// Average-hash distance at or below which two frames are identical.
    pub epsilon: u32,
}

impl Default for SettleParams {
    fn default() -> Self {
        Self {
            max_wait_ms: 12_000,
            min_stable_ms: 1_200,
            min_observe_ms: 600,
            epsilon: 3,
        }
    }
}

/// One observation on the timeline.
#[derive(Debug, Clone)]
pub struct Sample<T> {
    pub at_ms: u64,
    pub hash: u64,
    pub frame: T,
}

/// Chooses among timed samples: the latest frame that closed a stable window,
/// otherwise the latest frame observed. Returns `None` only for no samples.
pub fn settle_frames<T, I>(samples: I, params: SettleParams) -> Option<T>
where
    I: IntoIterator<Item = Sample<T>>,
{
    let mut samples = samples.into_iter();
    let first = samples.next()?;
    let origin = first.at_ms;

    let mut prev_hash = first.hash;
    let mut last = first.frame;
    let mut best: Option<T> = None;
    let mut stable_since: Option<u64> = None;
    let mut changed = false;

    for sample in samples {
        let elapsed = sample.at_ms.saturating_sub(origin);
        if elapsed > params.max_wait_ms {
            break;
        }

        if hamming64(prev_hash, sample.hash) <= params.epsilon {
            let since = *stable_since.get_or_insert(sample.at_ms);
            let stable_for = sample.at_ms.saturating_sub(since);
            if stable_for >= params.min_stable_ms && (elapsed >= params.min_observe_ms || changed)
            {
                prev_hash = sample.hash;
                best = Some(sample.frame);
                continue;
            }
        } else {
            stable_since = None;
            changed = true;
        }
        prev_hash = sample.hash;
        last = sample.frame;
    }

    best.or(Some(last))
}

/// Re-encodes the settled frame of an animated GIF as PNG.
///
/// Returns `None` for any other format and for single-frame GIFs, which are
/// captured as they are.
pub fn settle_animation(bytes: &[u8], params: SettleParams) -> Result<Option<Vec<u8>>, ImageError> {
    if image::guess_format(bytes).ok() != Some(ImageFormat::Gif) {
        return Ok(None);
    }

    let decoder =
        GifDecoder::new(Cursor::new(bytes)).map_err(|e| ImageError::Decode(e.to_string()))?;

    let mut samples = Vec::new();
    let mut at_ms = 0u64;
    for frame in decoder.into_frames().take(MAX_FRAMES) {
        let frame = frame.map_err(|e| ImageError::Decode(e.to_string()))?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay = match u64::from(numer) / u64::from(denom.max(1)) {
            0 => ZERO_DELAY_MS,
            ms => ms,
        };
        let img = DynamicImage::ImageRgba8(frame.into_buffer());
        samples.push(Sample {
            at_ms,
            hash: average_hash(&img),
            frame: img,
        });
        at_ms += delay;
    }

    if samples.len() < 2 {
        return Ok(None);
    }
    let count = samples.len();
    let Some(chosen) = settle_frames(samples, params) else {
        return Ok(None);
    };
    tracing::debug!(event = "animation_settled", frames = count);
    encode_png(&chosen).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, GenericImageView, Rgba, RgbaImage};

    fn sample(at_ms: u64, hash: u64, frame: &'static str) -> Sample<&'static str> {
        Sample { at_ms, hash, frame }
    }

    #[test]
    fn test_empty_timeline() {
        let none: Vec<Sample<&str>> = Vec::new();
        assert_eq!(settle_frames(none, SettleParams::default()), None);
    }

    #[test]
    fn test_keeps_last_stable_frame() {
        let frames = vec![
            sample(0, 0x00, "intro"),
            sample(300, 0xFFFF, "cta"),
            sample(600, 0xFFFF, "cta-2"),
            sample(2_000, 0xFFFE, "cta-3"),
            sample(2_300, 0x0F0F_0000, "flash"),
        ];
        assert_eq!(settle_frames(frames, SettleParams::default()), Some("cta-3"));
    }

    #[test]
    fn test_falls_back_to_latest_when_never_stable() {
        let frames = vec![
            sample(0, 0x00, "a"),
            sample(200, 0xFF, "b"),
            sample(400, 0xFF00, "c"),
        ];
        assert_eq!(settle_frames(frames, SettleParams::default()), Some("c"));
    }

    #[test]
    fn test_ignores_samples_after_max_wait() {
        let params = SettleParams {
            max_wait_ms: 1_000,
            ..SettleParams::default()
        };
        let frames = vec![sample(0, 0x00, "a"), sample(500, 0xFF, "b"), sample(5_000, 0xFF00, "late")];
        assert_eq!(settle_frames(frames, params), Some("b"));
    }

    #[test]
    fn test_static_content_needs_warm_up() {
        let params = SettleParams {
            min_stable_ms: 100,
            min_observe_ms: 1_000,
            ..SettleParams::default()
        };
        let frames = vec![sample(0, 1, "a"), sample(100, 1, "b"), sample(300, 1, "c")];
        // never accepted as settled, so the latest frame wins
        assert_eq!(settle_frames(frames, params), Some("c"));
    }

    fn half(vertical: bool) -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, y| {
            let lit = if vertical { x < 8 } else { y < 8 };
            if lit {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    fn gif(frames: Vec<(RgbaImage, u32)>) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder
                .encode_frames(frames.into_iter().map(|(img, ms)| {
                    Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(ms, 1))
                }))
                .unwrap();
        }
        out
    }

    #[test]
    fn test_settle_animation_picks_end_state() {
        let bytes = gif(vec![
            (half(true), 500),
            (half(false), 1_500),
            (half(false), 1_500),
            (half(false), 1_500),
        ]);
        let png = settle_animation(&bytes, SettleParams::default())
            .unwrap()
            .unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!(img.dimensions(), (16, 16));
        assert_eq!(img.get_pixel(15, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(0, 15), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_settle_animation_passes_through_other_formats() {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(half(true))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        assert_eq!(settle_animation(&png, SettleParams::default()).unwrap(), None);

        let single = gif(vec![(half(true), 100)]);
        assert_eq!(settle_animation(&single, SettleParams::default()).unwrap(), None);
    }
}
