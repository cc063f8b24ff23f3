// 画像XObjectのメタデータ解析とペイロード抽出（フィルタ展開・色空間解決）

use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object};

use crate::error::ExtractError;
use crate::raster::{ColorModel, EncodedImage, SampleLayout};

/// 色空間解決の再帰上限（Indexed の base など）
const MAX_COLOR_SPACE_DEPTH: u8 = 2;

/// 解決済みの色空間
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColorSpace {
    /// 宣言された色空間名（配列の場合は先頭要素）
    pub name: String,
    /// 非圧縮サンプルの解釈。未対応の色空間では None
    pub model: Option<ColorModel>,
    /// ICCBased の埋め込みプロファイル
    pub icc_profile: Option<Vec<u8>>,
}

impl ResolvedColorSpace {
    fn device(name: &str, model: ColorModel) -> Self {
        ResolvedColorSpace {
            name: name.to_string(),
            model: Some(model),
            icc_profile: None,
        }
    }
}

/// 画像XObjectのメタデータ
#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub color_space: ResolvedColorSpace,
    pub filters: Vec<String>,
    pub image_mask: bool,
    pub decode_inverted: bool,
    pub smask_in_data: bool,
}

/// 画像XObjectのストリーム辞書からメタデータを読み取る。
pub fn read_image_meta(doc: &Document, dict: &Dictionary) -> crate::error::Result<ImageMeta> {
    let width = dict_get_u32(doc, dict, b"Width")?;
    let height = dict_get_u32(doc, dict, b"Height")?;

    let image_mask = matches!(resolve(doc, dict.get(b"ImageMask").ok()), Some(Object::Boolean(true)));

    // ImageMask は常に1bit。それ以外は missing key の場合のみデフォルト8
    let bits_per_component = if image_mask {
        1
    } else {
        match dict.get(b"BitsPerComponent") {
            Ok(_) => dict_get_u32(doc, dict, b"BitsPerComponent")? as u8,
            Err(_) => 8,
        }
    };

    let color_space = if image_mask {
        ResolvedColorSpace::device("DeviceGray", ColorModel::Gray)
    } else {
        match dict.get(b"ColorSpace") {
            Ok(obj) => resolve_color_space(doc, obj, 0)?,
            // JPX は色空間をペイロード内に持つ
            Err(_) => ResolvedColorSpace::device("DeviceRGB", ColorModel::Rgb),
        }
    };

    let smask_in_data = match resolve(doc, dict.get(b"SMaskInData").ok()) {
        Some(Object::Integer(i)) => *i > 0,
        _ => false,
    };

    Ok(ImageMeta {
        width,
        height,
        bits_per_component,
        color_space,
        filters: filter_names(doc, dict),
        image_mask,
        decode_inverted: decode_is_inverted(doc, dict),
        smask_in_data,
    })
}

/// 参照を1段だけ解決する
fn resolve<'a>(doc: &'a Document, obj: Option<&'a Object>) -> Option<&'a Object> {
    match obj {
        Some(Object::Reference(id)) => doc.get_object(*id).ok(),
        other => other,
    }
}

/// 辞書からu32値を取得するヘルパー（負の値はエラー）
fn dict_get_u32(doc: &Document, dict: &Dictionary, key: &[u8]) -> crate::error::Result<u32> {
    match resolve(doc, dict.get(key).ok()) {
        Some(Object::Integer(i)) => u32::try_from(*i).map_err(|_| {
            ExtractError::image_xobject(format!(
                "Value out of u32 range for {:?}: {}",
                String::from_utf8_lossy(key),
                i
            ))
        }),
        Some(Object::Real(f)) if *f >= 0.0 && *f <= u32::MAX as f32 => Ok(*f as u32),
        Some(other) => Err(ExtractError::image_xobject(format!(
            "Expected integer for {:?}, got {:?}",
            String::from_utf8_lossy(key),
            other
        ))),
        None => Err(ExtractError::image_xobject(format!(
            "Missing required key: {:?}",
            String::from_utf8_lossy(key),
        ))),
    }
}

/// Filter エントリを名前のリストとして返す（単一名・配列の両方に対応）
fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<String> {
    match resolve(doc, dict.get(b"Filter").ok()) {
        Some(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|obj| match resolve(doc, Some(obj)) {
                Some(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `/Decode` の全ペアが [1 0] 形式（反転）かどうか
fn decode_is_inverted(doc: &Document, dict: &Dictionary) -> bool {
    let Some(Object::Array(arr)) = resolve(doc, dict.get(b"Decode").ok()) else {
        return false;
    };
    let values: Vec<f32> = arr
        .iter()
        .filter_map(|obj| match obj {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(f) => Some(*f),
            _ => None,
        })
        .collect();
    !values.is_empty()
        && values.len() % 2 == 0
        && values.chunks_exact(2).all(|pair| pair[0] > pair[1])
}

fn name_of(obj: &Object) -> Option<String> {
    match obj {
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// `/ColorSpace` エントリを解決する。
pub fn resolve_color_space(
    doc: &Document,
    obj: &Object,
    depth: u8,
) -> crate::error::Result<ResolvedColorSpace> {
    if depth > MAX_COLOR_SPACE_DEPTH {
        return Err(ExtractError::image_xobject("Color space nesting too deep"));
    }

    let obj = resolve(doc, Some(obj))
        .ok_or_else(|| ExtractError::image_xobject("Dangling color space reference"))?;

    match obj {
        Object::Name(name) => Ok(device_color_space(&String::from_utf8_lossy(name))),
        Object::Array(arr) => {
            let family = arr
                .first()
                .and_then(name_of)
                .ok_or_else(|| ExtractError::image_xobject("Color space array without a name"))?;
            match family.as_str() {
                "ICCBased" => icc_based(doc, arr),
                "Indexed" | "I" => indexed(doc, arr, depth),
                "CalGray" => Ok(ResolvedColorSpace::device("CalGray", ColorModel::Gray)),
                "CalRGB" => Ok(ResolvedColorSpace::device("CalRGB", ColorModel::Rgb)),
                // Separation / DeviceN / Lab: サンプルの解釈は未対応
                other => Ok(ResolvedColorSpace {
                    name: other.to_string(),
                    model: None,
                    icc_profile: None,
                }),
            }
        }
        other => Err(ExtractError::image_xobject(format!(
            "Unexpected color space object: {:?}",
            other
        ))),
    }
}

fn device_color_space(name: &str) -> ResolvedColorSpace {
    let model = match name {
        "DeviceGray" | "G" | "CalGray" => Some(ColorModel::Gray),
        "DeviceRGB" | "RGB" | "CalRGB" => Some(ColorModel::Rgb),
        "DeviceCMYK" | "CMYK" => Some(ColorModel::Cmyk),
        _ => None,
    };
    ResolvedColorSpace {
        name: name.to_string(),
        model,
        icc_profile: None,
    }
}

/// `[/ICCBased <stream>]`: /N でモデルを決め、プロファイル本体を保持する。
fn icc_based(doc: &Document, arr: &[Object]) -> crate::error::Result<ResolvedColorSpace> {
    let stream = arr
        .get(1)
        .and_then(|o| resolve(doc, Some(o)))
        .and_then(|o| o.as_stream().ok())
        .ok_or_else(|| ExtractError::image_xobject("ICCBased without a profile stream"))?;

    let n = match resolve(doc, stream.dict.get(b"N").ok()) {
        Some(Object::Integer(n)) => *n,
        _ => 0,
    };
    let model = match n {
        1 => Some(ColorModel::Gray),
        3 => Some(ColorModel::Rgb),
        4 => Some(ColorModel::Cmyk),
        _ => None,
    };

    let profile = stream_bytes(stream).ok();

    Ok(ResolvedColorSpace {
        name: "ICCBased".to_string(),
        model,
        icc_profile: profile,
    })
}

/// `[/Indexed base hival lookup]`
fn indexed(doc: &Document, arr: &[Object], depth: u8) -> crate::error::Result<ResolvedColorSpace> {
    if arr.len() < 4 {
        return Err(ExtractError::image_xobject("Indexed color space needs 4 entries"));
    }

    let base = resolve_color_space(doc, &arr[1], depth + 1)?;
    let base_model = base.model.clone().ok_or_else(|| {
        ExtractError::image_xobject(format!("Unsupported Indexed base: {}", base.name))
    })?;

    let hival = match resolve(doc, Some(&arr[2])) {
        Some(Object::Integer(h)) => (*h).clamp(0, 255) as u8,
        _ => return Err(ExtractError::image_xobject("Indexed hival must be an integer")),
    };

    let palette = match resolve(doc, Some(&arr[3])) {
        Some(Object::String(bytes, _)) => bytes.clone(),
        Some(Object::Stream(stream)) => stream_bytes(stream)?,
        _ => return Err(ExtractError::image_xobject("Indexed lookup must be a string or stream")),
    };

    Ok(ResolvedColorSpace {
        name: "Indexed".to_string(),
        model: Some(ColorModel::Indexed {
            base: Box::new(base_model),
            hival,
            palette,
        }),
        icc_profile: base.icc_profile,
    })
}

/// 画像以外のストリーム（ICCプロファイル・パレット）の展開済みバイト列
fn stream_bytes(stream: &lopdf::Stream) -> crate::error::Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    Ok(stream.decompressed_content()?)
}

/// 画像XObjectのストリームをペイロードへ変換する。
///
/// - 末尾フィルタが画像コーデック（DCT/JPX/JBIG2/CCITT）ならその形式のバイト列
/// - FlateDecode のみ、またはフィルタなしなら展開済みサンプル（`raw`）
///
/// 画像コーデックの前段にある FlateDecode は展開する。
pub fn encoded_payload(
    stream: &lopdf::Stream,
    meta: &ImageMeta,
) -> crate::error::Result<EncodedImage> {
    let (codec, preceding) = match meta.filters.split_last() {
        Some((last, rest)) if codec_extension(last).is_some() => (Some(last.as_str()), rest),
        _ => (None, meta.filters.as_slice()),
    };

    let mut data = stream.content.clone();
    for filter in preceding {
        data = match filter.as_str() {
            "FlateDecode" | "Fl" => {
                let inflated = inflate(&data)?;
                match (codec, predictor_params(&stream.dict)) {
                    (None, Some(params)) => unpredict(&inflated, &params, meta)?,
                    _ => inflated,
                }
            }
            other => {
                return Err(ExtractError::image_xobject(format!(
                    "Unsupported image filter: {}",
                    other
                )));
            }
        };
    }

    match codec {
        Some(name) => Ok(EncodedImage {
            bytes: data,
            extension: codec_extension(name).unwrap_or("bin").to_string(),
            layout: None,
            invert: meta.decode_inverted,
        }),
        None => {
            let color = meta.color_space.model.clone().ok_or_else(|| {
                ExtractError::image_xobject(format!(
                    "Unsupported color space for raw samples: {}",
                    meta.color_space.name
                ))
            })?;
            Ok(EncodedImage {
                bytes: data,
                extension: "raw".to_string(),
                invert: false,
                layout: Some(SampleLayout {
                    width: meta.width,
                    height: meta.height,
                    bits_per_component: meta.bits_per_component,
                    color,
                    invert: meta.decode_inverted,
                }),
            })
        }
    }
}

/// 画像コーデック系フィルタ名 -> 拡張子
fn codec_extension(filter: &str) -> Option<&'static str> {
    match filter {
        "DCTDecode" | "DCT" => Some("jpeg"),
        "JPXDecode" => Some("jpx"),
        "JBIG2Decode" => Some("jb2"),
        "CCITTFaxDecode" | "CCF" => Some("fax"),
        _ => None,
    }
}

/// FlateDecode (zlib) の展開
fn inflate(data: &[u8]) -> crate::error::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| ExtractError::image_xobject(format!("FlateDecode error: {}", e)))?;
    Ok(decompressed)
}

/// `/DecodeParms` の Predictor 設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PredictorParams {
    predictor: i64,
    colors: usize,
    bits_per_component: usize,
    columns: usize,
}

fn predictor_params(dict: &Dictionary) -> Option<PredictorParams> {
    let parms = match dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.iter().find_map(|o| o.as_dict().ok())?,
        _ => return None,
    };
    let int = |key: &[u8], default: i64| -> i64 {
        parms.get(key).and_then(Object::as_i64).unwrap_or(default)
    };
    let predictor = int(b"Predictor", 1);
    if predictor <= 1 {
        return None;
    }
    Some(PredictorParams {
        predictor,
        colors: int(b"Colors", 1).max(1) as usize,
        bits_per_component: int(b"BitsPerComponent", 8).max(1) as usize,
        columns: int(b"Columns", 1).max(1) as usize,
    })
}

/// TIFF Predictor 2 / PNG Predictor (10..=15) を元に戻す。
fn unpredict(
    data: &[u8],
    params: &PredictorParams,
    meta: &ImageMeta,
) -> crate::error::Result<Vec<u8>> {
    let bpp = (params.colors * params.bits_per_component).div_ceil(8).max(1);
    let row_len = (params.colors * params.bits_per_component * params.columns).div_ceil(8);

    if params.predictor == 2 {
        if params.bits_per_component != 8 {
            return Err(ExtractError::image_xobject(format!(
                "TIFF predictor with {} bpc is not supported",
                params.bits_per_component
            )));
        }
        let mut out = data.to_vec();
        for row in out.chunks_mut(row_len) {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        return Ok(out);
    }

    let mut out = Vec::with_capacity(row_len * meta.height as usize);
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < row_len + 1 {
            break;
        }
        let (tag, encoded) = (chunk[0], &chunk[1..]);
        let mut row = encoded.to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match tag {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(ExtractError::image_xobject(format!(
                        "Invalid PNG predictor tag: {}",
                        other
                    )));
                }
            };
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
