// 画像単位処理: 分類 → 戦略ごとのハンドラ → 保存（失敗は画像単位で隔離）

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ExtractError;
use crate::raster::{OutputFormat, PixelBuffer, RasterCodec};
use crate::store::{DocumentStore, ImageDescriptor};
use crate::transparency::{
    ColorPath, CompositeScore, Orientation, PassThroughList, ReconstructionStrategy, ResolverConfig,
    classify, normalize_mask, resolve, to_rgb,
};

/// Per-run settings consumed by the image handlers.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub pass_through: PassThroughList,
    pub alpha_format: OutputFormat,
    pub opaque_format: OutputFormat,
    pub resolver: ResolverConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            pass_through: PassThroughList::new(["jpeg"]),
            alpha_format: OutputFormat::Webp,
            opaque_format: OutputFormat::Webp,
            resolver: ResolverConfig::default(),
        }
    }
}

/// Fallback path taken for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Soft mask could not be fetched or decoded; written opaque.
    MaskUnavailable,
    /// Reconstruction failed; raw payload written instead.
    RawBytes,
}

/// Both orientation scores of a mask composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrientationReport {
    pub chosen: Orientation,
    pub as_supplied: CompositeScore,
    pub inverted: CompositeScore,
}

/// Outcome of one image. Page and image numbers are 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub page: u32,
    pub index: u32,
    pub xref: String,
    pub extension: String,
    pub color_space: String,
    pub mask_ref: Option<String>,
    pub internal_alpha: bool,
    pub strategy: ReconstructionStrategy,
    pub fallback: Option<Fallback>,
    pub color_conversion: Option<&'static str>,
    pub orientation: Option<OrientationReport>,
    pub output_file: Option<String>,
    pub sha256: Option<String>,
    pub error: Option<String>,
}

impl ImageRecord {
    /// 出力ファイルが書き込まれたか
    pub fn is_processed(&self) -> bool {
        self.output_file.is_some()
    }
}

/// ハンドラの出力
#[derive(Debug)]
struct Reconstruction {
    bytes: Vec<u8>,
    extension: String,
    fallback: Option<Fallback>,
    color: ColorPath,
    orientation: Option<OrientationReport>,
}

/// Borrowed collaborators for one image.
struct ImageContext<'a> {
    store: &'a dyn DocumentStore,
    codec: &'a dyn RasterCodec,
    config: &'a ExtractorConfig,
    descriptor: &'a ImageDescriptor,
}

type Handler = fn(&ImageContext<'_>) -> crate::error::Result<Reconstruction>;

/// Strategy tag -> handler.
fn handler_for(strategy: ReconstructionStrategy) -> Handler {
    match strategy {
        ReconstructionStrategy::PassThroughRaw => pass_through,
        ReconstructionStrategy::CompositeWithMask => composite_with_mask,
        ReconstructionStrategy::CompositeWithInternalAlpha => composite_with_internal_alpha,
        ReconstructionStrategy::OpaqueConvert => opaque_convert,
    }
}

/// `image_<page>_<index>` (1-based).
pub fn output_stem(descriptor: &ImageDescriptor) -> String {
    format!(
        "image_{}_{}",
        descriptor.page_index + 1,
        descriptor.image_index + 1
    )
}

/// Raw-bytes fallback name: `image_<page>_<index>.raw.<ext>`.
pub fn fallback_file_name(descriptor: &ImageDescriptor) -> String {
    let ext = match descriptor.extension() {
        "raw" | "" => "bin",
        other => other,
    };
    format!("{}.raw.{}", output_stem(descriptor), ext)
}

/// Process one image and write its output into `output_dir`.
///
/// Never fails: reconstruction errors (and panics inside decoders) fall back
/// to writing the raw payload. Only a failed write of that fallback leaves
/// the record without an output file.
pub fn process_image(
    store: &dyn DocumentStore,
    codec: &dyn RasterCodec,
    config: &ExtractorConfig,
    descriptor: &ImageDescriptor,
    output_dir: &Path,
) -> ImageRecord {
    let strategy = classify(descriptor, &config.pass_through);
    let page = descriptor.page_index + 1;
    let index = descriptor.image_index + 1;

    tracing::info!(
        page,
        index,
        xref = %descriptor.object_ref,
        ext = descriptor.extension(),
        color_space = %descriptor.color_space,
        smask = ?descriptor.mask_ref.map(|r| r.to_string()),
        internal_alpha = descriptor.internal_alpha,
        strategy = %strategy,
        "found image"
    );

    let mut record = ImageRecord {
        page,
        index,
        xref: descriptor.object_ref.to_string(),
        extension: descriptor.extension().to_string(),
        color_space: descriptor.color_space.clone(),
        mask_ref: descriptor.mask_ref.map(|r| r.to_string()),
        internal_alpha: descriptor.internal_alpha,
        strategy,
        fallback: None,
        color_conversion: None,
        orientation: None,
        output_file: None,
        sha256: None,
        error: None,
    };

    let ctx = ImageContext {
        store,
        codec,
        config,
        descriptor,
    };
    let handler = handler_for(strategy);
    let outcome = catch_unwind(AssertUnwindSafe(|| handler(&ctx))).unwrap_or_else(|panic| {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(ExtractError::compositing(format!("panic while reconstructing: {msg}")))
    });

    let (file_name, bytes) = match outcome {
        Ok(rec) => {
            record.fallback = rec.fallback;
            record.color_conversion = match rec.color {
                ColorPath::Unchanged => None,
                ColorPath::Profile => Some("icc_profile"),
                ColorPath::DirectMapping => Some("direct_mapping"),
            };
            record.orientation = rec.orientation;
            (format!("{}.{}", output_stem(descriptor), rec.extension), rec.bytes)
        }
        Err(e) => {
            tracing::error!(
                page,
                index,
                xref = %descriptor.object_ref,
                error = %e,
                "reconstruction failed, saving raw bytes"
            );
            record.fallback = Some(Fallback::RawBytes);
            record.error = Some(e.to_string());
            (fallback_file_name(descriptor), descriptor.payload.bytes.clone())
        }
    };

    let path = output_dir.join(&file_name);
    match std::fs::write(&path, &bytes) {
        Ok(()) => {
            tracing::info!(page, index, path = %path.display(), "saved image");
            record.sha256 = Some(hex::encode(Sha256::digest(&bytes)));
            record.output_file = Some(file_name);
        }
        Err(e) => {
            tracing::error!(page, index, path = %path.display(), error = %e, "failed to write image");
            record.error = Some(e.to_string());
        }
    }

    record
}

fn pass_through(ctx: &ImageContext<'_>) -> crate::error::Result<Reconstruction> {
    tracing::info!(
        xref = %ctx.descriptor.object_ref,
        ext = ctx.descriptor.extension(),
        "skipping conversion"
    );
    Ok(Reconstruction {
        bytes: ctx.descriptor.payload.bytes.clone(),
        extension: ctx.descriptor.extension().to_string(),
        fallback: None,
        color: ColorPath::Unchanged,
        orientation: None,
    })
}

/// ベース画像をデコードしてRGB系に正規化する
fn decode_base(ctx: &ImageContext<'_>) -> crate::error::Result<(PixelBuffer, ColorPath)> {
    let decoded = ctx.codec.decode(&ctx.descriptor.payload)?;
    Ok(to_rgb(decoded, ctx.descriptor.icc_profile.as_deref()))
}

fn composite_with_mask(ctx: &ImageContext<'_>) -> crate::error::Result<Reconstruction> {
    let (base, color) = decode_base(ctx)?;

    let mask = match fetch_mask(ctx) {
        Ok(mask) => mask,
        Err(e) => {
            tracing::warn!(
                xref = %ctx.descriptor.object_ref,
                error = %e,
                "soft mask unavailable, writing opaque image"
            );
            let mut rec = encode_opaque(ctx, base, color)?;
            rec.fallback = Some(Fallback::MaskUnavailable);
            return Ok(rec);
        }
    };

    let candidate = normalize_mask(&mask, base.dimensions())?;
    let resolution = resolve(&base, &candidate, &ctx.config.resolver)?;

    tracing::info!(
        xref = %ctx.descriptor.object_ref,
        as_supplied_score = resolution.as_supplied.score,
        inverted_score = resolution.inverted.score,
        as_supplied_visible = resolution.as_supplied.visible_ratio,
        inverted_visible = resolution.inverted.visible_ratio,
        chosen = ?resolution.orientation,
        "resolved mask orientation"
    );

    let format = ctx.config.alpha_format;
    Ok(Reconstruction {
        bytes: ctx.codec.encode(&resolution.image, format)?,
        extension: format.extension().to_string(),
        fallback: None,
        color,
        orientation: Some(OrientationReport {
            chosen: resolution.orientation,
            as_supplied: resolution.as_supplied,
            inverted: resolution.inverted,
        }),
    })
}

/// マスク取得・デコードの失敗はすべて MaskUnavailable として扱う
fn fetch_mask(ctx: &ImageContext<'_>) -> crate::error::Result<PixelBuffer> {
    let mask_ref = ctx
        .descriptor
        .mask_ref
        .ok_or_else(|| ExtractError::mask_unavailable("no mask reference"))?;
    let payload = ctx
        .store
        .extract_raw_bytes(mask_ref)
        .map_err(|e| ExtractError::mask_unavailable(format!("{mask_ref}: {e}")))?;
    ctx.codec
        .decode(&payload)
        .map_err(|e| ExtractError::mask_unavailable(format!("{mask_ref}: {e}")))
}

fn composite_with_internal_alpha(ctx: &ImageContext<'_>) -> crate::error::Result<Reconstruction> {
    let (image, color) = decode_base(ctx)?;
    if !image.mode().has_alpha() {
        tracing::warn!(
            xref = %ctx.descriptor.object_ref,
            "payload decoded without an alpha channel, promoting to opaque alpha"
        );
    }
    let image = image.with_opaque_alpha();

    let format = ctx.config.alpha_format;
    Ok(Reconstruction {
        bytes: ctx.codec.encode(&image, format)?,
        extension: format.extension().to_string(),
        fallback: None,
        color,
        orientation: None,
    })
}

fn opaque_convert(ctx: &ImageContext<'_>) -> crate::error::Result<Reconstruction> {
    let (image, color) = decode_base(ctx)?;
    encode_opaque(ctx, image, color)
}

fn encode_opaque(
    ctx: &ImageContext<'_>,
    image: PixelBuffer,
    color: ColorPath,
) -> crate::error::Result<Reconstruction> {
    let image = image.without_alpha();
    let format = ctx.config.opaque_format;
    Ok(Reconstruction {
        bytes: ctx.codec.encode(&image, format)?,
        extension: format.extension().to_string(),
        fallback: None,
        color,
        orientation: None,
    })
}
