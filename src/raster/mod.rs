pub mod codec;
pub mod samples;

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// ピクセルバッファのチャンネル構成。
///
/// `Cmyk` はデコード直後の入力専用モードで、Color Normalizer を通過した後は
/// 残らない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    Cmyk,
}

impl ChannelMode {
    /// 1ピクセルあたりのバイト数（8bit/チャンネル固定）。
    pub fn channels(self) -> usize {
        match self {
            ChannelMode::Gray => 1,
            ChannelMode::GrayAlpha => 2,
            ChannelMode::Rgb => 3,
            ChannelMode::Rgba | ChannelMode::Cmyk => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, ChannelMode::GrayAlpha | ChannelMode::Rgba)
    }
}

/// 行優先・8bit/チャンネルのピクセルバッファ。
///
/// 変換は常に新しいバッファを返し、既存バッファを書き換えない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    mode: ChannelMode,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// 寸法とモードに一致する長さのデータからバッファを作成する。
    pub fn new(
        width: u32,
        height: u32,
        mode: ChannelMode,
        data: Vec<u8>,
    ) -> crate::error::Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|wh| wh.checked_mul(mode.channels()))
            .ok_or_else(|| {
                ExtractError::decode(format!(
                    "Overflow computing buffer size for {}x{} {:?} image",
                    width, height, mode
                ))
            })?;

        if data.len() != expected {
            return Err(ExtractError::decode(format!(
                "{:?} data size mismatch: expected {} bytes, got {}",
                mode,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            mode,
            data,
        })
    }

    /// 既存バッファから導出したデータ用。長さは呼び出し側が保証する。
    pub(crate) fn derived(width: u32, height: u32, mode: ChannelMode, data: Vec<u8>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * mode.channels()
        );
        Self {
            width,
            height,
            mode,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// `image` クレートのバッファから変換する。8bit以外の型は8bitに丸める。
    pub fn from_dynamic(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let (mode, data) = match img {
            DynamicImage::ImageLuma8(buf) => (ChannelMode::Gray, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => (ChannelMode::GrayAlpha, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (ChannelMode::Rgb, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (ChannelMode::Rgba, buf.into_raw()),
            other => {
                let color = other.color();
                match (color.has_color(), color.has_alpha()) {
                    (false, false) => (ChannelMode::Gray, other.to_luma8().into_raw()),
                    (false, true) => (ChannelMode::GrayAlpha, other.to_luma_alpha8().into_raw()),
                    (true, false) => (ChannelMode::Rgb, other.to_rgb8().into_raw()),
                    (true, true) => (ChannelMode::Rgba, other.to_rgba8().into_raw()),
                }
            }
        };
        Self {
            width,
            height,
            mode,
            data,
        }
    }

    /// `image` クレートのバッファへ変換する。CMYK は表現できないためエラー。
    pub fn to_dynamic(&self) -> crate::error::Result<DynamicImage> {
        let (w, h) = (self.width, self.height);
        let data = self.data.clone();
        let mismatch = || ExtractError::encode("Pixel buffer does not match its dimensions");
        let img = match self.mode {
            ChannelMode::Gray => {
                DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, data).ok_or_else(mismatch)?)
            }
            ChannelMode::GrayAlpha => DynamicImage::ImageLumaA8(
                GrayAlphaImage::from_raw(w, h, data).ok_or_else(mismatch)?,
            ),
            ChannelMode::Rgb => {
                DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, data).ok_or_else(mismatch)?)
            }
            ChannelMode::Rgba => {
                DynamicImage::ImageRgba8(RgbaImage::from_raw(w, h, data).ok_or_else(mismatch)?)
            }
            ChannelMode::Cmyk => {
                return Err(ExtractError::encode(
                    "CMYK buffers must be normalized to RGB before conversion",
                ));
            }
        };
        Ok(img)
    }

    /// アルファチャンネルを落とした新しいバッファを返す（Gray/Rgb はそのまま）。
    pub fn without_alpha(self) -> Self {
        let mode = match self.mode {
            ChannelMode::GrayAlpha => ChannelMode::Gray,
            ChannelMode::Rgba => ChannelMode::Rgb,
            _ => return self,
        };
        let src_channels = self.mode.channels();
        let data = self
            .data
            .chunks_exact(src_channels)
            .flat_map(|px| px[..src_channels - 1].iter().copied())
            .collect();
        Self {
            width: self.width,
            height: self.height,
            mode,
            data,
        }
    }

    /// RGB に展開した新しいバッファを返す。アルファは捨てる。
    pub fn to_rgb(&self) -> crate::error::Result<Self> {
        let data: Vec<u8> = match self.mode {
            ChannelMode::Rgb => self.data.clone(),
            ChannelMode::Rgba => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            ChannelMode::Gray => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            ChannelMode::GrayAlpha => self
                .data
                .chunks_exact(2)
                .flat_map(|px| [px[0], px[0], px[0]])
                .collect(),
            ChannelMode::Cmyk => {
                return Err(ExtractError::compositing(
                    "CMYK buffers must be normalized to RGB before compositing",
                ));
            }
        };
        Self::new(self.width, self.height, ChannelMode::Rgb, data)
    }

    /// 色チャンネルを反転した新しいバッファを返す。アルファはそのまま。
    pub fn inverted_color(self) -> Self {
        let channels = self.mode.channels();
        let color_channels = if self.mode.has_alpha() {
            channels - 1
        } else {
            channels
        };
        let mut data = self.data;
        for px in data.chunks_exact_mut(channels) {
            for v in &mut px[..color_channels] {
                *v = 255 - *v;
            }
        }
        Self { data, ..self }
    }

    /// アルファ付きモードへ昇格した新しいバッファを返す（アルファは不透明）。
    pub fn with_opaque_alpha(self) -> Self {
        let mode = match self.mode {
            ChannelMode::Gray => ChannelMode::GrayAlpha,
            ChannelMode::Rgb => ChannelMode::Rgba,
            _ => return self,
        };
        let src_channels = self.mode.channels();
        let data = self
            .data
            .chunks_exact(src_channels)
            .flat_map(|px| px.iter().copied().chain(std::iter::once(255)))
            .collect();
        Self {
            width: self.width,
            height: self.height,
            mode,
            data,
        }
    }
}

/// 出力ファイル形式（いずれも可逆）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Webp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }
}

/// Raw sample color model for `raw` payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// Palette lookup. `palette` holds `(hival + 1) * base.components()` bytes.
    Indexed {
        base: Box<ColorModel>,
        hival: u8,
        palette: Vec<u8>,
    },
}

impl ColorModel {
    /// 1サンプルあたりのコンポーネント数。
    pub fn components(&self) -> usize {
        match self {
            ColorModel::Gray | ColorModel::Indexed { .. } => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }
}

/// Layout of uncompressed image samples as stored in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLayout {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub color: ColorModel,
    /// `/Decode [1 0]`-style inversion of every component.
    pub invert: bool,
}

/// Encoded image payload as handed out by a document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    /// Declared format extension (`jpeg`, `jpx`, `raw`, ...).
    pub extension: String,
    /// Present only for `raw` payloads.
    pub layout: Option<SampleLayout>,
    /// コーデック形式のペイロードに `/Decode [1 0 ...]` が付いている場合 true。
    /// `raw` は `layout.invert` で表す。
    pub invert: bool,
}

/// Raster codec collaborator: bytes <-> pixel buffers.
pub trait RasterCodec: Sync {
    /// Decode a payload, preserving any alpha channel it carries.
    fn decode(&self, payload: &EncodedImage) -> crate::error::Result<PixelBuffer>;

    /// Encode a buffer into the given lossless format.
    fn encode(&self, buffer: &PixelBuffer, format: OutputFormat) -> crate::error::Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_size_mismatch() {
        assert!(PixelBuffer::new(2, 2, ChannelMode::Rgb, vec![0; 11]).is_err());
        assert!(PixelBuffer::new(2, 2, ChannelMode::Rgb, vec![0; 12]).is_ok());
    }

    #[test]
    fn test_without_alpha_drops_last_channel() {
        let buf = PixelBuffer::new(1, 2, ChannelMode::Rgba, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let rgb = buf.without_alpha();
        assert_eq!(rgb.mode(), ChannelMode::Rgb);
        assert_eq!(rgb.data(), &[1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn test_with_opaque_alpha_appends_255() {
        let buf = PixelBuffer::new(2, 1, ChannelMode::Gray, vec![10, 20]).unwrap();
        let ga = buf.with_opaque_alpha();
        assert_eq!(ga.mode(), ChannelMode::GrayAlpha);
        assert_eq!(ga.data(), &[10, 255, 20, 255]);
    }

    #[test]
    fn test_dynamic_round_trip_keeps_mode() {
        let buf = PixelBuffer::new(1, 1, ChannelMode::GrayAlpha, vec![9, 128]).unwrap();
        let back = PixelBuffer::from_dynamic(buf.to_dynamic().unwrap());
        assert_eq!(back, buf);
    }

    #[test]
    fn test_cmyk_cannot_become_dynamic() {
        let buf = PixelBuffer::new(1, 1, ChannelMode::Cmyk, vec![0, 0, 0, 0]).unwrap();
        assert!(buf.to_dynamic().is_err());
        assert!(buf.to_rgb().is_err());
    }
}
