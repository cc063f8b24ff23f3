// 画像ごとの透過情報から再構成戦略を1回だけ決定する

use serde::Serialize;

use crate::store::ImageDescriptor;

/// 画像1枚に対する再構成戦略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionStrategy {
    /// 元のバイト列をそのまま保存する。
    PassThroughRaw,
    /// 別オブジェクトのソフトマスクとベース画像を合成する。
    CompositeWithMask,
    /// ペイロード自身のアルファチャンネルを保持して変換する。
    CompositeWithInternalAlpha,
    /// アルファなしの可逆形式へ変換する。
    OpaqueConvert,
}

impl ReconstructionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconstructionStrategy::PassThroughRaw => "pass_through_raw",
            ReconstructionStrategy::CompositeWithMask => "composite_with_mask",
            ReconstructionStrategy::CompositeWithInternalAlpha => "composite_with_internal_alpha",
            ReconstructionStrategy::OpaqueConvert => "opaque_convert",
        }
    }
}

impl std::fmt::Display for ReconstructionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extensions kept byte-identical when no transparency is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassThroughList {
    extensions: Vec<String>,
}

impl PassThroughList {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extensions: Vec<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        extensions.sort();
        extensions.dedup();
        Self { extensions }
    }

    pub fn contains(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// Select the reconstruction strategy for one image.
///
/// Precedence is fixed: explicit mask, then internal alpha, then the
/// pass-through list, then opaque conversion.
pub fn classify(descriptor: &ImageDescriptor, pass_through: &PassThroughList) -> ReconstructionStrategy {
    if descriptor.mask_ref.is_some() {
        ReconstructionStrategy::CompositeWithMask
    } else if descriptor.internal_alpha {
        ReconstructionStrategy::CompositeWithInternalAlpha
    } else if pass_through.contains(&descriptor.payload.extension) {
        ReconstructionStrategy::PassThroughRaw
    } else {
        ReconstructionStrategy::OpaqueConvert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_through_list_normalizes_entries() {
        let list = PassThroughList::new([" JPEG", ".png", "", "jpeg"]);
        assert_eq!(list.extensions(), &["jpeg".to_string(), "png".to_string()]);
        assert!(list.contains("Jpeg"));
        assert!(!list.contains("jpx"));
    }
}
