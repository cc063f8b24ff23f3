use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::raster::OutputFormat;
use crate::transparency::orientation::DEFAULT_VISIBILITY_THRESHOLD;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 透過情報がない場合にバイト列をそのまま保存する拡張子
    pub pass_through_extensions: Vec<String>,
    /// アルファ付き出力の形式
    pub alpha_format: OutputFormat,
    /// アルファなし出力の形式
    pub opaque_format: OutputFormat,
    pub visibility_threshold: u8,
    pub parallel_workers: usize,
    /// 指定時は実行ごとにログファイルを作成する
    pub log_dir: Option<PathBuf>,
    pub write_manifest: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            pass_through_extensions: vec!["jpeg".to_string()],
            alpha_format: OutputFormat::Webp,
            opaque_format: OutputFormat::Webp,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            parallel_workers: 0,
            log_dir: None,
            write_manifest: true,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::ExtractError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
