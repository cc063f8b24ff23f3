// ジョブ単位: PDF読込 -> 画像列挙 -> 並列再構成 -> マニフェスト出力

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::error::ExtractError;
use crate::logging::RunContext;
use crate::pdf::PdfStore;
use crate::pipeline::extractor::{ExtractorConfig, ImageRecord, process_image};
use crate::raster::RasterCodec;
use crate::raster::codec::ImageCodec;
use crate::store::{DocumentStore, ImageDescriptor};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Configuration for a single job.
pub struct JobConfig {
    pub input_path: PathBuf,
    /// 出力ディレクトリ（存在しなければ作成）
    pub output_dir: PathBuf,
    /// 1-based pages to extract. `None` means all pages.
    pub pages: Option<Vec<u32>>,
    pub extractor: ExtractorConfig,
    /// 0 = rayon default
    pub parallel_workers: usize,
    pub write_manifest: bool,
}

/// Result of processing a single job.
#[derive(Debug)]
pub struct JobResult {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    /// 出力ファイルを書けた画像数（フォールバック含む）
    pub images_processed: usize,
    pub fallbacks: usize,
    pub records: Vec<ImageRecord>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    input: String,
    images_found: usize,
    images_processed: usize,
    fallbacks: usize,
    images: &'a [ImageRecord],
}

/// Run a single extraction job against the PDF at `input_path`.
///
/// Logs go to `ctx`; worker threads enter it explicitly.
pub fn run_job(config: &JobConfig, ctx: &RunContext) -> crate::error::Result<JobResult> {
    let store = ctx.in_scope(|| PdfStore::open(&config.input_path))?;
    extract_all(&store, &ImageCodec, config, ctx)
}

/// Run the extraction with explicit collaborators.
///
/// Descriptors are collected page by page (sequential), then each image is
/// reconstructed on the rayon pool.
pub fn extract_all(
    store: &dyn DocumentStore,
    codec: &dyn RasterCodec,
    config: &JobConfig,
    ctx: &RunContext,
) -> crate::error::Result<JobResult> {
    let page_indices = select_pages(store.page_count(), config.pages.as_deref())?;
    std::fs::create_dir_all(&config.output_dir)?;

    let descriptors = ctx.in_scope(|| collect_descriptors(store, &page_indices));
    ctx.in_scope(|| {
        tracing::info!(
            pages = page_indices.len(),
            images = descriptors.len(),
            output = %config.output_dir.display(),
            "starting extraction"
        )
    });

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallel_workers)
        .build()
        .map_err(|e| ExtractError::config(format!("Failed to build worker pool: {e}")))?;

    let mut records: Vec<ImageRecord> = pool.install(|| {
        descriptors
            .par_iter()
            .map(|d| {
                ctx.in_scope(|| {
                    process_image(store, codec, &config.extractor, d, &config.output_dir)
                })
            })
            .collect()
    });

    records.sort_by_key(|r| (r.page, r.index));

    let images_processed: usize = records.iter().map(|r| usize::from(r.is_processed())).sum();
    let fallbacks: usize = records.iter().map(|r| usize::from(r.fallback.is_some())).sum();

    if config.write_manifest {
        write_manifest(
            &config.output_dir.join(MANIFEST_FILE_NAME),
            &Manifest {
                input: config.input_path.display().to_string(),
                images_found: records.len(),
                images_processed,
                fallbacks,
                images: &records,
            },
        )?;
    }

    ctx.in_scope(|| {
        tracing::info!(images_processed, fallbacks, "extraction finished")
    });

    Ok(JobResult {
        input_path: config.input_path.clone(),
        output_dir: config.output_dir.clone(),
        images_processed,
        fallbacks,
        records,
    })
}

/// 1-based の指定ページを 0-based のインデックス列に変換する。
///
/// 範囲外のページ番号はエラー。
fn select_pages(page_count: u32, pages: Option<&[u32]>) -> crate::error::Result<Vec<u32>> {
    match pages {
        None => Ok((0..page_count).collect()),
        Some(pages) => pages
            .iter()
            .map(|&p| {
                if p < 1 || p > page_count {
                    Err(ExtractError::config(format!(
                        "page {p} out of range (document has {page_count} pages)"
                    )))
                } else {
                    Ok(p - 1)
                }
            })
            .collect(),
    }
}

/// ページ単位の列挙失敗はログに残してスキップする
fn collect_descriptors(store: &dyn DocumentStore, page_indices: &[u32]) -> Vec<ImageDescriptor> {
    let mut descriptors = Vec::new();
    for &page_index in page_indices {
        match store.page_images(page_index) {
            Ok(images) => {
                tracing::debug!(page = page_index + 1, images = images.len(), "enumerated page");
                descriptors.extend(images);
            }
            Err(e) => {
                tracing::error!(page = page_index + 1, error = %e, "failed to enumerate page images");
            }
        }
    }
    descriptors
}

fn write_manifest(path: &Path, manifest: &Manifest<'_>) -> crate::error::Result<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_pages_defaults_to_all() {
        assert_eq!(select_pages(3, None).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_select_pages_converts_to_zero_based() {
        assert_eq!(select_pages(5, Some(&[2, 5])).unwrap(), vec![1, 4]);
    }

    #[test]
    fn test_select_pages_rejects_out_of_range() {
        assert!(select_pages(2, Some(&[3])).is_err());
    }
}
