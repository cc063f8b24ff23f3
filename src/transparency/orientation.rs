// マスクの向き（白=不透明 / 黒=不透明）を2候補の合成結果から決定する
//
// Producers disagree on whether high mask intensity means opaque or
// transparent. Both compositions are scored and the better one is kept:
// brighter, moderately covered results win over near-black, fully opaque or
// fully transparent ones.

use serde::Serialize;

use super::mask::{LUMA_WEIGHTS, MaskCandidate};
use crate::error::ExtractError;
use crate::raster::{ChannelMode, PixelBuffer};

/// Visible-coverage band outside of which a candidate is penalized.
pub const COVERAGE_BAND: (f64, f64) = (0.02, 0.98);

/// Penalty applied to candidates outside [`COVERAGE_BAND`].
pub const COVERAGE_PENALTY: f64 = 1000.0;

/// Weight of mean alpha in the final score.
pub const ALPHA_WEIGHT: f64 = 0.3;

/// Default alpha threshold above which a pixel counts as visible.
pub const DEFAULT_VISIBILITY_THRESHOLD: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Alpha strictly greater than this value is visible.
    pub visibility_threshold: u8,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    AsSupplied,
    Inverted,
}

/// Score of one RGBA candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompositeScore {
    pub visible_ratio: f64,
    pub mean_alpha: f64,
    pub mean_brightness: f64,
    pub coverage_penalty: f64,
    pub score: f64,
}

impl CompositeScore {
    /// Build a score from its measured parts.
    pub fn from_parts(visible_ratio: f64, mean_alpha: f64, mean_brightness: f64) -> Self {
        let (lo, hi) = COVERAGE_BAND;
        let coverage_penalty = if visible_ratio < lo || visible_ratio > hi {
            COVERAGE_PENALTY
        } else {
            0.0
        };
        CompositeScore {
            visible_ratio,
            mean_alpha,
            mean_brightness,
            coverage_penalty,
            score: mean_brightness + ALPHA_WEIGHT * mean_alpha - coverage_penalty,
        }
    }
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// RGBA composite in the chosen orientation.
    pub image: PixelBuffer,
    pub orientation: Orientation,
    pub as_supplied: CompositeScore,
    pub inverted: CompositeScore,
}

/// Score an RGBA buffer. Non-RGBA input is an error.
pub fn score_rgba(rgba: &PixelBuffer, config: &ResolverConfig) -> crate::error::Result<CompositeScore> {
    if rgba.mode() != ChannelMode::Rgba {
        return Err(ExtractError::compositing(format!(
            "Expected RGBA buffer for scoring, got {:?}",
            rgba.mode()
        )));
    }

    let total = rgba.pixel_count();
    if total == 0 {
        return Ok(CompositeScore::from_parts(0.0, 0.0, 0.0));
    }

    let mut visible = 0usize;
    let mut alpha_sum = 0u64;
    let mut brightness_sum = 0.0f64;
    for px in rgba.data().chunks_exact(4) {
        alpha_sum += px[3] as u64;
        if px[3] > config.visibility_threshold {
            visible += 1;
            brightness_sum += LUMA_WEIGHTS[0] * px[0] as f64
                + LUMA_WEIGHTS[1] * px[1] as f64
                + LUMA_WEIGHTS[2] * px[2] as f64;
        }
    }

    let mean_brightness = if visible == 0 {
        0.0
    } else {
        brightness_sum / visible as f64
    };

    Ok(CompositeScore::from_parts(
        visible as f64 / total as f64,
        alpha_sum as f64 / total as f64,
        mean_brightness,
    ))
}

/// Pick the winning orientation. Ties keep the mask as supplied.
pub fn choose_orientation(as_supplied: &CompositeScore, inverted: &CompositeScore) -> Orientation {
    if inverted.score > as_supplied.score {
        Orientation::Inverted
    } else {
        Orientation::AsSupplied
    }
}

/// Composite `base` with `mask` in both orientations and keep the better one.
///
/// `base` is expanded to RGB first (alpha dropped). Its dimensions must
/// equal the mask's; run the mask through `normalize_mask` beforehand.
pub fn resolve(
    base: &PixelBuffer,
    mask: &MaskCandidate,
    config: &ResolverConfig,
) -> crate::error::Result<Resolution> {
    if base.dimensions() != mask.buffer().dimensions() {
        return Err(ExtractError::compositing(format!(
            "Mask size {:?} does not match base size {:?}",
            mask.buffer().dimensions(),
            base.dimensions()
        )));
    }

    let rgb = base.to_rgb()?;
    let inverted_mask = mask.inverted();

    let supplied_rgba = composite(&rgb, mask.values());
    let inverted_rgba = composite(&rgb, inverted_mask.values());

    let as_supplied = score_rgba(&supplied_rgba, config)?;
    let inverted = score_rgba(&inverted_rgba, config)?;

    let orientation = choose_orientation(&as_supplied, &inverted);
    let image = match orientation {
        Orientation::AsSupplied => supplied_rgba,
        Orientation::Inverted => inverted_rgba,
    };

    Ok(Resolution {
        image,
        orientation,
        as_supplied,
        inverted,
    })
}

/// RGB + alpha 列 -> RGBA。
fn composite(rgb: &PixelBuffer, alpha: &[u8]) -> PixelBuffer {
    let data = rgb
        .data()
        .chunks_exact(3)
        .zip(alpha)
        .flat_map(|(px, &a)| [px[0], px[1], px[2], a])
        .collect();
    PixelBuffer::derived(rgb.width(), rgb.height(), ChannelMode::Rgba, data)
}
