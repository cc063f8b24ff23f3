// ソフトマスクを単一チャンネル輝度へ変換し、ベース画像の寸法へ再標本化する

use image::GrayImage;
use image::imageops::{self, FilterType};

use super::color::direct_cmyk_to_rgb;
use crate::error::ExtractError;
use crate::raster::{ChannelMode, PixelBuffer};

/// Rec. 709 luma weights, shared with the orientation scorer.
pub const LUMA_WEIGHTS: [f64; 3] = [0.2126, 0.7152, 0.0722];

/// Single-channel mask in one orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskCandidate {
    buffer: PixelBuffer,
    inverted: bool,
}

impl MaskCandidate {
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn values(&self) -> &[u8] {
        self.buffer.data()
    }

    /// Pixel-wise complement (`255 - v`) as a new candidate.
    pub fn inverted(&self) -> MaskCandidate {
        let data = self.buffer.data().iter().map(|&v| 255 - v).collect();
        MaskCandidate {
            buffer: PixelBuffer::derived(
                self.buffer.width(),
                self.buffer.height(),
                ChannelMode::Gray,
                data,
            ),
            inverted: !self.inverted,
        }
    }
}

/// Reduce `mask` to intensity and resize it to `target` (width, height).
///
/// Resizing uses bilinear filtering; the output dimensions always equal
/// `target`.
pub fn normalize_mask(mask: &PixelBuffer, target: (u32, u32)) -> crate::error::Result<MaskCandidate> {
    let intensity = to_intensity(mask);
    let (target_w, target_h) = target;

    let buffer = if intensity.dimensions() == target {
        intensity
    } else {
        let (w, h) = intensity.dimensions();
        let gray = GrayImage::from_raw(w, h, intensity.into_data())
            .ok_or_else(|| ExtractError::compositing("Mask buffer does not match its dimensions"))?;
        // 最近傍補間はマスク境界に穴を生むため使わない
        let resized = imageops::resize(&gray, target_w, target_h, FilterType::Triangle);
        PixelBuffer::derived(target_w, target_h, ChannelMode::Gray, resized.into_raw())
    };

    Ok(MaskCandidate {
        buffer,
        inverted: false,
    })
}

/// 任意モードのマスクを輝度のみのバッファにする。
fn to_intensity(mask: &PixelBuffer) -> PixelBuffer {
    let (w, h) = mask.dimensions();
    let data: Vec<u8> = match mask.mode() {
        ChannelMode::Gray => return mask.clone(),
        ChannelMode::GrayAlpha => mask.data().chunks_exact(2).map(|px| px[0]).collect(),
        ChannelMode::Rgb => mask.data().chunks_exact(3).map(luma).collect(),
        ChannelMode::Rgba => mask.data().chunks_exact(4).map(luma).collect(),
        ChannelMode::Cmyk => direct_cmyk_to_rgb(mask)
            .data()
            .chunks_exact(3)
            .map(luma)
            .collect(),
    };
    PixelBuffer::derived(w, h, ChannelMode::Gray, data)
}

fn luma(px: &[u8]) -> u8 {
    let y = LUMA_WEIGHTS[0] * px[0] as f64
        + LUMA_WEIGHTS[1] * px[1] as f64
        + LUMA_WEIGHTS[2] * px[2] as f64;
    y.round().clamp(0.0, 255.0) as u8
}
