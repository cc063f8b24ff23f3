// 非圧縮サンプル列（FlateDecode展開後を含む）から PixelBuffer を構築する

use super::{ChannelMode, ColorModel, PixelBuffer, SampleLayout};
use crate::error::ExtractError;

/// Raw samples -> PixelBuffer.
///
/// Rows are padded to a byte boundary as PDF requires for `bpc < 8`.
/// 16-bit samples keep their high byte. Indexed samples are expanded
/// through the palette into the base color model.
pub fn decode_samples(data: &[u8], layout: &SampleLayout) -> crate::error::Result<PixelBuffer> {
    let bpc = layout.bits_per_component;
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(ExtractError::decode(format!(
            "Unsupported BitsPerComponent: {}",
            bpc
        )));
    }

    let width = layout.width as usize;
    let height = layout.height as usize;
    let components = layout.color.components();

    let row_bits = width
        .checked_mul(components)
        .and_then(|n| n.checked_mul(bpc as usize))
        .ok_or_else(|| ExtractError::decode("Overflow computing row size"))?;
    let row_bytes = row_bits.div_ceil(8);
    let expected = row_bytes
        .checked_mul(height)
        .ok_or_else(|| ExtractError::decode("Overflow computing sample buffer size"))?;

    if data.len() < expected {
        return Err(ExtractError::decode(format!(
            "Sample data too short: expected {}, got {}",
            expected,
            data.len()
        )));
    }

    let max_value = if bpc == 16 { 255 } else { (1u16 << bpc) - 1 };
    let mut samples = Vec::with_capacity(width * height * components);
    for row in data[..expected].chunks_exact(row_bytes) {
        for i in 0..width * components {
            let raw = read_sample(row, i, bpc);
            let value = if layout.invert { max_value - raw } else { raw };
            samples.push(value);
        }
    }

    match &layout.color {
        ColorModel::Indexed {
            base,
            hival,
            palette,
        } => expand_palette(&samples, layout, base, *hival, palette),
        color => {
            let scaled: Vec<u8> = samples.iter().map(|&v| scale(v, max_value)).collect();
            let mode = match color {
                ColorModel::Gray => ChannelMode::Gray,
                ColorModel::Rgb => ChannelMode::Rgb,
                _ => ChannelMode::Cmyk,
            };
            PixelBuffer::new(layout.width, layout.height, mode, scaled)
        }
    }
}

/// `index` 番目のサンプル値を読む（16bitは上位バイトのみ）。
fn read_sample(row: &[u8], index: usize, bpc: u8) -> u16 {
    match bpc {
        8 => row[index] as u16,
        16 => row[index * 2] as u16,
        _ => {
            let bit = index * bpc as usize;
            let byte = row[bit / 8];
            let shift = 8 - bpc as usize - (bit % 8);
            ((byte >> shift) as u16) & ((1u16 << bpc) - 1)
        }
    }
}

fn scale(value: u16, max_value: u16) -> u8 {
    if max_value == 255 {
        value as u8
    } else {
        ((value as u32 * 255 + max_value as u32 / 2) / max_value as u32) as u8
    }
}

fn expand_palette(
    indices: &[u16],
    layout: &SampleLayout,
    base: &ColorModel,
    hival: u8,
    palette: &[u8],
) -> crate::error::Result<PixelBuffer> {
    let base_components = base.components();
    let needed = (hival as usize + 1) * base_components;
    if palette.len() < needed {
        return Err(ExtractError::decode(format!(
            "Palette too short: expected {}, got {}",
            needed,
            palette.len()
        )));
    }

    let mode = match base {
        ColorModel::Gray => ChannelMode::Gray,
        ColorModel::Rgb => ChannelMode::Rgb,
        ColorModel::Cmyk => ChannelMode::Cmyk,
        ColorModel::Indexed { .. } => {
            return Err(ExtractError::decode("Nested Indexed color space"));
        }
    };

    let mut data = Vec::with_capacity(indices.len() * base_components);
    for &idx in indices {
        // 範囲外のインデックスは hival に丸める
        let idx = (idx as usize).min(hival as usize);
        let start = idx * base_components;
        data.extend_from_slice(&palette[start..start + base_components]);
    }

    PixelBuffer::new(layout.width, layout.height, mode, data)
}
