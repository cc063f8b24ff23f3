// image crate: payload bytes <-> PixelBuffer

use std::io::Cursor;

use image::{ImageDecoder, ImageFormat, ImageReader};
use zune_jpeg::JpegDecoder;
use zune_jpeg::zune_core::bytestream::ZCursor;
use zune_jpeg::zune_core::colorspace::ColorSpace;
use zune_jpeg::zune_core::options::DecoderOptions;

use super::samples::decode_samples;
use super::{ChannelMode, EncodedImage, OutputFormat, PixelBuffer, RasterCodec};
use crate::error::ExtractError;

/// `image` クレートによる RasterCodec 実装。
///
/// `raw` ペイロードはサンプルレイアウトに従って展開し、それ以外は
/// 先頭バイトからフォーマットを推定してデコードする。
/// 4成分の JPEG だけは `zune-jpeg` で CMYK のまま取り出す。
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl RasterCodec for ImageCodec {
    fn decode(&self, payload: &EncodedImage) -> crate::error::Result<PixelBuffer> {
        if payload.extension == "raw" {
            let layout = payload.layout.as_ref().ok_or_else(|| {
                ExtractError::decode("raw payload is missing its sample layout")
            })?;
            return decode_samples(&payload.bytes, layout);
        }

        let buffer = self.decode_encoded(payload)?;
        Ok(if payload.invert {
            buffer.inverted_color()
        } else {
            buffer
        })
    }

    fn encode(&self, buffer: &PixelBuffer, format: OutputFormat) -> crate::error::Result<Vec<u8>> {
        let img = buffer.to_dynamic()?;
        let mut buf = Cursor::new(Vec::new());
        match format {
            OutputFormat::Png => img.write_to(&mut buf, ImageFormat::Png)?,
            OutputFormat::Webp => {
                let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut buf);
                img.write_with_encoder(encoder)?;
            }
        }
        Ok(buf.into_inner())
    }
}

impl ImageCodec {
    fn decode_encoded(&self, payload: &EncodedImage) -> crate::error::Result<PixelBuffer> {
        if is_jpeg(&payload.bytes) {
            if let Some(cmyk) = decode_cmyk_jpeg(&payload.bytes)? {
                return Ok(cmyk);
            }
        }

        let reader = ImageReader::new(Cursor::new(&payload.bytes))
            .with_guessed_format()
            .map_err(|e| {
                ExtractError::decode(format!("{} format detection error: {}", payload.extension, e))
            })?;
        if reader.format().is_none() {
            return Err(ExtractError::decode(format!(
                "Unsupported payload format: {}",
                payload.extension
            )));
        }
        let img = reader.decode().map_err(|e| {
            ExtractError::decode(format!("{} decode error: {}", payload.extension, e))
        })?;
        Ok(PixelBuffer::from_dynamic(img))
    }
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8])
}

/// 4成分 JPEG を CMYK サンプルのままデコードする。
///
/// 3成分以下なら `None`（通常の `image` 経路に任せる）。
/// Adobe APP14 付きの CMYK は反転格納されているので戻す。
/// YCCK は YCbCr → CMY を自前で行い、K は常に反転格納として扱う。
fn decode_cmyk_jpeg(bytes: &[u8]) -> crate::error::Result<Option<PixelBuffer>> {
    let jpeg_error = |e: zune_jpeg::errors::DecodeErrors| {
        ExtractError::decode(format!("jpeg decode error: {:?}", e))
    };

    let mut headers = JpegDecoder::new(ZCursor::new(bytes));
    headers.decode_headers().map_err(jpeg_error)?;
    let input = match headers.input_colorspace() {
        Some(cs @ (ColorSpace::CMYK | ColorSpace::YCCK)) => cs,
        _ => return Ok(None),
    };

    let options = DecoderOptions::default().jpeg_set_out_colorspace(input);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(bytes), options);
    let mut data = decoder.decode().map_err(jpeg_error)?;
    let info = decoder
        .info()
        .ok_or_else(|| ExtractError::decode("jpeg headers were not decoded"))?;

    if input == ColorSpace::YCCK {
        for px in data.chunks_exact_mut(4) {
            let (c, m, y) = ycc_to_cmy(px[0], px[1], px[2]);
            px[0] = c;
            px[1] = m;
            px[2] = y;
            px[3] = 255 - px[3];
        }
    } else if has_adobe_marker(bytes) {
        for v in &mut data {
            *v = 255 - *v;
        }
    }

    PixelBuffer::new(
        u32::from(info.width),
        u32::from(info.height),
        ChannelMode::Cmyk,
        data,
    )
    .map(Some)
}

fn ycc_to_cmy(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;
    let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    (
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    )
}

/// SOS までのマーカーセグメントを走査し、Adobe APP14 の有無を返す。
fn has_adobe_marker(bytes: &[u8]) -> bool {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return false;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0xDA || marker == 0xD9 {
            return false;
        }
        let len = usize::from(u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]));
        let body = pos + 4;
        if marker == 0xEE && bytes.get(body..body + 5) == Some(b"Adobe".as_slice()) {
            return true;
        }
        pos += 2 + len;
    }
    false
}

/// Header-only check for an alpha channel inside an encoded payload.
///
/// Returns `false` for payloads the `image` crate cannot identify.
pub fn payload_has_alpha(bytes: &[u8]) -> bool {
    let Ok(reader) = ImageReader::new(Cursor::new(bytes)).with_guessed_format() else {
        return false;
    };
    if reader.format().is_none() {
        return false;
    }
    reader
        .into_decoder()
        .map(|decoder| decoder.color_type().has_alpha())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{ChannelMode, ColorModel, SampleLayout};
    use image::{DynamicImage, RgbaImage};

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_png_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4])));
        let payload = EncodedImage {
            bytes: png_bytes(&img),
            extension: "png".to_string(),
            invert: false,
            layout: None,
        };
        let buf = ImageCodec.decode(&payload).unwrap();
        assert_eq!(buf.mode(), ChannelMode::Rgba);
        assert_eq!(buf.dimensions(), (3, 2));
        assert_eq!(&buf.data()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_raw_requires_layout() {
        let payload = EncodedImage {
            bytes: vec![0; 3],
            extension: "raw".to_string(),
            invert: false,
            layout: None,
        };
        assert!(ImageCodec.decode(&payload).is_err());
    }

    #[test]
    fn test_decode_raw_with_layout() {
        let payload = EncodedImage {
            bytes: vec![10, 20, 30],
            extension: "raw".to_string(),
            invert: false,
            layout: Some(SampleLayout {
                width: 1,
                height: 1,
                bits_per_component: 8,
                color: ColorModel::Rgb,
                invert: false,
            }),
        };
        let buf = ImageCodec.decode(&payload).unwrap();
        assert_eq!(buf.data(), &[10, 20, 30]);
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let payload = EncodedImage {
            bytes: b"not an image".to_vec(),
            extension: "jpx".to_string(),
            invert: false,
            layout: None,
        };
        assert!(ImageCodec.decode(&payload).is_err());
    }

    fn cmyk_jpeg(pixel: [u8; 4], color_type: jpeg_encoder::ColorType) -> Vec<u8> {
        let data: Vec<u8> = pixel.iter().copied().cycle().take(4 * 4 * 4).collect();
        let mut out = Vec::new();
        jpeg_encoder::Encoder::new(&mut out, 100)
            .encode(&data, 4, 4, color_type)
            .unwrap();
        out
    }

    fn jpeg_payload(bytes: Vec<u8>, invert: bool) -> EncodedImage {
        EncodedImage {
            bytes,
            extension: "jpeg".to_string(),
            layout: None,
            invert,
        }
    }

    fn assert_close(actual: &[u8], expected: &[u8]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!(a.abs_diff(*e) <= 3, "got {:?}, expected {:?}", actual, expected);
        }
    }

    #[test]
    fn test_decode_cmyk_jpeg_keeps_cmyk_samples() {
        let cyan = cmyk_jpeg([255, 0, 0, 0], jpeg_encoder::ColorType::Cmyk);
        assert!(has_adobe_marker(&cyan));

        let buf = ImageCodec.decode(&jpeg_payload(cyan, false)).unwrap();
        assert_eq!(buf.mode(), ChannelMode::Cmyk);
        assert_eq!(buf.dimensions(), (4, 4));
        assert_close(&buf.data()[..4], &[255, 0, 0, 0]);
    }

    #[test]
    fn test_decode_ycck_jpeg_keeps_cmyk_samples() {
        let ink = cmyk_jpeg([0, 255, 0, 64], jpeg_encoder::ColorType::CmykAsYcck);
        let buf = ImageCodec.decode(&jpeg_payload(ink, false)).unwrap();
        assert_eq!(buf.mode(), ChannelMode::Cmyk);
        assert_close(&buf.data()[..4], &[0, 255, 0, 64]);
    }

    #[test]
    fn test_decode_inverted_cmyk_jpeg() {
        let cyan = cmyk_jpeg([255, 0, 0, 0], jpeg_encoder::ColorType::Cmyk);
        let buf = ImageCodec.decode(&jpeg_payload(cyan, true)).unwrap();
        assert_eq!(buf.mode(), ChannelMode::Cmyk);
        assert_close(&buf.data()[..4], &[0, 255, 255, 255]);
    }

    #[test]
    fn test_decode_rgb_jpeg_stays_on_image_path() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
        let bytes = buf.into_inner();
        assert!(!has_adobe_marker(&bytes));

        let plain = ImageCodec.decode(&jpeg_payload(bytes.clone(), false)).unwrap();
        assert_eq!(plain.mode(), ChannelMode::Rgb);
        assert_close(&plain.data()[..3], &[0, 0, 0]);

        let inverted = ImageCodec.decode(&jpeg_payload(bytes, true)).unwrap();
        assert_close(&inverted.data()[..3], &[255, 255, 255]);
    }

    #[test]
    fn test_encode_webp_and_png_decode_back() {
        let buf = PixelBuffer::new(2, 2, ChannelMode::Rgba, (0..16).collect()).unwrap();
        for format in [OutputFormat::Png, OutputFormat::Webp] {
            let bytes = ImageCodec.encode(&buf, format).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(decoded.width(), 2);
            assert!(decoded.color().has_alpha(), "{:?} should keep alpha", format);
        }
    }

    #[test]
    fn test_payload_has_alpha_reads_header() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(1, 1));
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::new(1, 1));
        assert!(payload_has_alpha(&png_bytes(&rgba)));
        assert!(!payload_has_alpha(&png_bytes(&rgb)));
        assert!(!payload_has_alpha(b"garbage"));
    }
}
