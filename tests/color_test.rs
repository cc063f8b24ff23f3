// CMYK -> RGB 正規化のテスト

use pdf_image_extract::raster::{ChannelMode, PixelBuffer};
use pdf_image_extract::transparency::color::direct_cmyk_to_rgb;
use pdf_image_extract::transparency::{ColorPath, to_rgb};

/// ヘルパー: CMYK → Lab の lut8 (A2B0) だけを持つ最小の入力プロファイル (ICC v2.1)
///
/// K=100% の格子点は L*=0、それ以外は C/M/Y の量に応じて暗くなる。
fn cmyk_input_profile() -> Vec<u8> {
    fn s15_16(v: f64) -> [u8; 4] {
        ((v * 65536.0).round() as i32).to_be_bytes()
    }
    let d50 = [0.9642, 1.0, 0.8249];

    let mut wtpt = b"XYZ \0\0\0\0".to_vec();
    for v in d50 {
        wtpt.extend(s15_16(v));
    }

    let mut lut = b"mft1\0\0\0\0".to_vec();
    lut.extend([4, 3, 2, 0]);
    for i in 0..9 {
        lut.extend(s15_16(if i % 4 == 0 { 1.0 } else { 0.0 }));
    }
    for _ in 0..4 {
        lut.extend(0..=255u8);
    }
    // 先頭の入力チャンネルが最も遅く変化する
    for idx in 0..16u32 {
        let (c, m, y, k) = ((idx >> 3) & 1, (idx >> 2) & 1, (idx >> 1) & 1, idx & 1);
        let l = if k == 1 { 0 } else { 255 - 80 * (c + m + y) };
        lut.extend([l as u8, 128, 128]);
    }
    for _ in 0..3 {
        lut.extend(0..=255u8);
    }

    let tags: [(&[u8; 4], &[u8]); 2] = [(b"wtpt", wtpt.as_slice()), (b"A2B0", lut.as_slice())];
    let table_len = 4 + 12 * tags.len();
    let mut table = (tags.len() as u32).to_be_bytes().to_vec();
    let mut body = Vec::new();
    for (sig, data) in tags {
        let offset = 128 + table_len + body.len();
        table.extend(sig);
        table.extend((offset as u32).to_be_bytes());
        table.extend((data.len() as u32).to_be_bytes());
        body.extend_from_slice(data);
    }

    let total = 128 + table_len + body.len();
    let mut header = vec![0u8; 128];
    header[0..4].copy_from_slice(&(total as u32).to_be_bytes());
    header[8..12].copy_from_slice(&[2, 0x10, 0, 0]);
    header[12..16].copy_from_slice(b"scnr");
    header[16..20].copy_from_slice(b"CMYK");
    header[20..24].copy_from_slice(b"Lab ");
    header[36..40].copy_from_slice(b"acsp");
    for (i, v) in d50.into_iter().enumerate() {
        header[68 + 4 * i..72 + 4 * i].copy_from_slice(&s15_16(v));
    }

    [header, table, body].concat()
}

fn cmyk(pixels: &[[u8; 4]]) -> PixelBuffer {
    let data = pixels.iter().flatten().copied().collect();
    PixelBuffer::new(pixels.len() as u32, 1, ChannelMode::Cmyk, data).unwrap()
}

#[test]
fn test_non_cmyk_is_unchanged() {
    let rgb = PixelBuffer::new(1, 1, ChannelMode::Rgb, vec![1, 2, 3]).unwrap();
    let (out, path) = to_rgb(rgb.clone(), None);
    assert_eq!(path, ColorPath::Unchanged);
    assert_eq!(out, rgb);
}

#[test]
fn test_direct_mapping_extremes() {
    let buf = cmyk(&[[0, 0, 0, 0], [0, 0, 0, 255], [255, 0, 0, 0], [0, 255, 255, 0]]);
    let rgb = direct_cmyk_to_rgb(&buf);
    assert_eq!(rgb.mode(), ChannelMode::Rgb);
    assert_eq!(
        rgb.data(),
        &[255, 255, 255, 0, 0, 0, 0, 255, 255, 255, 0, 0]
    );
}

#[test]
fn test_direct_mapping_mid_tones() {
    // (255-128)*(255-0)/255 = 127
    let rgb = direct_cmyk_to_rgb(&cmyk(&[[128, 128, 128, 0]]));
    assert_eq!(rgb.data(), &[127, 127, 127]);
}

#[test]
fn test_missing_profile_falls_back_to_direct_mapping() {
    let buf = cmyk(&[[0, 0, 0, 255], [0, 0, 0, 0]]);
    let (out, path) = to_rgb(buf.clone(), None);
    assert_eq!(path, ColorPath::DirectMapping);
    assert_eq!(out, direct_cmyk_to_rgb(&buf));
}

#[test]
fn test_broken_profile_falls_back_without_inversion() {
    let buf = cmyk(&[[0, 0, 0, 0]]);
    let (out, path) = to_rgb(buf, Some(b"definitely not an ICC profile"));
    assert_eq!(path, ColorPath::DirectMapping);
    // フォールバック後に全体反転はしない
    assert_eq!(out.data(), &[255, 255, 255]);
    assert_eq!(out.dimensions(), (1, 1));
}

#[test]
fn test_embedded_profile_is_used_when_valid() {
    let icc = cmyk_input_profile();
    let buf = cmyk(&[[0, 0, 0, 0], [0, 0, 0, 255]]);

    let (out, path) = to_rgb(buf, Some(&icc));

    assert_eq!(path, ColorPath::Profile);
    assert_eq!(out.mode(), ChannelMode::Rgb);
    assert_eq!(out.dimensions(), (2, 1));
    let (paper, ink) = (&out.data()[..3], &out.data()[3..]);
    assert!(paper.iter().all(|&v| v >= 245), "paper should be white: {:?}", paper);
    assert!(ink.iter().all(|&v| v <= 10), "full black should stay dark: {:?}", ink);
}
