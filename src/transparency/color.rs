// CMYK -> RGB 正規化: ICCプロファイル変換を優先し、失敗時は直接変換

use lcms2::{Intent, PixelFormat, Profile, Transform};

use crate::error::ExtractError;
use crate::raster::{ChannelMode, PixelBuffer};

/// Which path produced the RGB buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPath {
    /// Input was not CMYK; returned unchanged.
    Unchanged,
    /// Embedded ICC profile -> sRGB.
    Profile,
    /// Direct arithmetic mapping after the profile transform failed.
    DirectMapping,
}

/// Convert a CMYK buffer to RGB. Any other mode is returned as-is.
///
/// Never fails: when the profile transform is unavailable the direct
/// channel mapping is used instead and a warning is logged.
pub fn to_rgb(buffer: PixelBuffer, profile: Option<&[u8]>) -> (PixelBuffer, ColorPath) {
    if buffer.mode() != ChannelMode::Cmyk {
        return (buffer, ColorPath::Unchanged);
    }

    match profile_transform(&buffer, profile) {
        Ok(rgb) => {
            tracing::debug!("converted CMYK to RGB using embedded ICC profile");
            (rgb, ColorPath::Profile)
        }
        Err(e) => {
            tracing::warn!(error = %e, "ICC profile transform failed, using direct CMYK mapping");
            (direct_cmyk_to_rgb(&buffer), ColorPath::DirectMapping)
        }
    }
}

/// ICCプロファイル（CMYK）から sRGB への変換。
fn profile_transform(buffer: &PixelBuffer, profile: Option<&[u8]>) -> crate::error::Result<PixelBuffer> {
    let icc = profile
        .ok_or_else(|| ExtractError::color_transform("no embedded CMYK profile"))?;

    let src = Profile::new_icc(icc)?;
    let dst = Profile::new_srgb();
    let transform: Transform<[u8; 4], [u8; 3]> = Transform::new(
        &src,
        PixelFormat::CMYK_8,
        &dst,
        PixelFormat::RGB_8,
        Intent::Perceptual,
    )?;

    let input: Vec<[u8; 4]> = buffer
        .data()
        .chunks_exact(4)
        .map(|px| [px[0], px[1], px[2], px[3]])
        .collect();
    let mut output = vec![[0u8; 3]; input.len()];
    transform.transform_pixels(&input, &mut output);

    PixelBuffer::new(
        buffer.width(),
        buffer.height(),
        ChannelMode::Rgb,
        output.into_iter().flatten().collect(),
    )
}

/// Lossy `(255 - c) * (255 - k) / 255` mapping. Always succeeds.
pub fn direct_cmyk_to_rgb(buffer: &PixelBuffer) -> PixelBuffer {
    let data: Vec<u8> = buffer
        .data()
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u32;
            let ch = |v: u8| (((255 - v as u32) * k + 127) / 255) as u8;
            [ch(px[0]), ch(px[1]), ch(px[2])]
        })
        .collect();

    PixelBuffer::derived(buffer.width(), buffer.height(), ChannelMode::Rgb, data)
}
