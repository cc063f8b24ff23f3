use std::path::PathBuf;

use super::job::Job;
use super::settings::Settings;
use crate::pipeline::extractor::ExtractorConfig;
use crate::raster::OutputFormat;
use crate::transparency::{PassThroughList, ResolverConfig};

#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub pages: Option<Vec<u32>>,
    pub pass_through_extensions: Vec<String>,
    pub alpha_format: OutputFormat,
    pub opaque_format: OutputFormat,
    pub visibility_threshold: u8,
    pub parallel_workers: usize,
    pub log_dir: Option<PathBuf>,
    pub write_manifest: bool,
}

impl MergedConfig {
    /// JobのOption値がSomeならJobの値を、NoneならSettingsの値を使用する。
    pub fn new(settings: &Settings, job: &Job) -> Self {
        MergedConfig {
            pages: job.pages.clone(),
            pass_through_extensions: job
                .pass_through_extensions
                .clone()
                .unwrap_or_else(|| settings.pass_through_extensions.clone()),
            alpha_format: job.alpha_format.unwrap_or(settings.alpha_format),
            opaque_format: job.opaque_format.unwrap_or(settings.opaque_format),
            visibility_threshold: settings.visibility_threshold,
            parallel_workers: settings.parallel_workers,
            log_dir: settings.log_dir.clone(),
            write_manifest: job.write_manifest.unwrap_or(settings.write_manifest),
        }
    }

    /// 画像ハンドラ向けの設定
    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            pass_through: PassThroughList::new(&self.pass_through_extensions),
            alpha_format: self.alpha_format,
            opaque_format: self.opaque_format,
            resolver: ResolverConfig {
                visibility_threshold: self.visibility_threshold,
            },
        }
    }
}
