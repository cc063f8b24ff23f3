// 再構成戦略の分類テスト

use pdf_image_extract::raster::EncodedImage;
use pdf_image_extract::store::{ImageDescriptor, ObjectRef};
use pdf_image_extract::transparency::{PassThroughList, ReconstructionStrategy, classify};

/// ヘルパー: 透過シグナルと拡張子だけを指定した記述子
fn descriptor(ext: &str, mask: bool, internal_alpha: bool) -> ImageDescriptor {
    ImageDescriptor {
        page_index: 0,
        image_index: 0,
        object_ref: ObjectRef::new(10, 0),
        payload: EncodedImage {
            bytes: vec![0; 4],
            extension: ext.to_string(),
            invert: false,
            layout: None,
        },
        color_space: "DeviceRGB".to_string(),
        width: 1,
        height: 1,
        mask_ref: mask.then(|| ObjectRef::new(11, 0)),
        internal_alpha,
        icc_profile: None,
    }
}

fn jpeg_only() -> PassThroughList {
    PassThroughList::new(["jpeg"])
}

// ============================================================
// 1. 優先順位
// ============================================================

#[test]
fn test_mask_wins_over_internal_alpha() {
    let d = descriptor("png", true, true);
    assert_eq!(
        classify(&d, &jpeg_only()),
        ReconstructionStrategy::CompositeWithMask
    );
}

#[test]
fn test_mask_wins_over_pass_through_list() {
    // 許可リストの拡張子でもマスクがあれば合成する
    let d = descriptor("jpeg", true, false);
    assert_eq!(
        classify(&d, &jpeg_only()),
        ReconstructionStrategy::CompositeWithMask
    );
}

#[test]
fn test_internal_alpha_wins_over_pass_through_list() {
    let d = descriptor("jpeg", false, true);
    assert_eq!(
        classify(&d, &jpeg_only()),
        ReconstructionStrategy::CompositeWithInternalAlpha
    );
}

#[test]
fn test_jpeg_without_signals_passes_through() {
    let d = descriptor("jpeg", false, false);
    assert_eq!(
        classify(&d, &jpeg_only()),
        ReconstructionStrategy::PassThroughRaw
    );
}

#[test]
fn test_unlisted_extension_is_opaque_convert() {
    for ext in ["raw", "jpx", "jb2", "bin"] {
        let d = descriptor(ext, false, false);
        assert_eq!(
            classify(&d, &jpeg_only()),
            ReconstructionStrategy::OpaqueConvert,
            "extension {ext}"
        );
    }
}

// ============================================================
// 2. 許可リスト
// ============================================================

#[test]
fn test_empty_pass_through_list_converts_jpeg() {
    let d = descriptor("jpeg", false, false);
    let list = PassThroughList::new(Vec::<String>::new());
    assert_eq!(classify(&d, &list), ReconstructionStrategy::OpaqueConvert);
}

#[test]
fn test_pass_through_list_is_case_and_dot_insensitive() {
    let list = PassThroughList::new([".JPEG", "Jpx"]);
    assert!(list.contains("jpeg"));
    assert!(list.contains("jpx"));
    assert!(!list.contains("png"));
    assert_eq!(
        classify(&descriptor("jpx", false, false), &list),
        ReconstructionStrategy::PassThroughRaw
    );
}

#[test]
fn test_strategy_names() {
    assert_eq!(
        ReconstructionStrategy::CompositeWithMask.to_string(),
        "composite_with_mask"
    );
    assert_eq!(
        serde_json::to_string(&ReconstructionStrategy::PassThroughRaw).unwrap(),
        "\"pass_through_raw\""
    );
}
