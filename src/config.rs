//! Configuration types for PDF-to-WebP conversion.
//!
//! Everything a request does not specify itself comes from
//! [`PipelineConfig`]: the default bucket, the default variant ladder, the
//! rasterizer command and DPI, the worker-pool bound, and the timeouts. The
//! config is injected when a [`crate::Pipeline`] is constructed, so tests and
//! deployments substitute their own defaults without touching globals.

use crate::error::ConversionError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// One output rendition of a page.
///
/// `key` doubles as a storage path segment
/// (`{editionId}/pages/{key}/{page}.webp`), so it must be unique within a
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSpec {
    /// Unique label, e.g. "low", "medium", "high", "thumbnail".
    pub key: String,
    /// Target width in pixels. The page is never upscaled past its natural width.
    pub width: u32,
    /// Target height in pixels. When set the page is cover-fitted (cropped)
    /// to exactly `width × height`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// WebP quality, 0–100.
    pub quality: u8,
}

impl VariantSpec {
    pub fn new(key: impl Into<String>, width: u32, quality: u8) -> Self {
        Self {
            key: key.into(),
            width,
            height: None,
            quality,
        }
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }
}

/// The stock low/medium/high ladder.
pub fn default_variants() -> Vec<VariantSpec> {
    vec![
        VariantSpec::new("low", 800, 70),
        VariantSpec::new("medium", 1400, 80),
        VariantSpec::new("high", 2000, 85),
    ]
}

/// The stock fixed-aspect thumbnail.
pub fn default_thumbnail() -> VariantSpec {
    VariantSpec::new("thumbnail", 300, 75).with_height(400)
}

/// Reject values that would not survive as exactly one storage path segment.
///
/// URL builders collapse `.` and `..`, and some backends treat `\` as a
/// separator, so any of those would put objects somewhere other than the
/// path reported back to the caller.
pub fn check_path_segment(field: &str, value: &str) -> Result<(), ConversionError> {
    if value.is_empty() {
        return Err(ConversionError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    if value == "." || value == ".." {
        return Err(ConversionError::Validation(format!(
            "{field} must not be '{value}'"
        )));
    }
    if value.contains(['/', '\\']) {
        return Err(ConversionError::Validation(format!(
            "{field} '{value}' must not contain '/' or '\\'"
        )));
    }
    Ok(())
}

/// Check a variant list plus its thumbnail: non-empty keys, unique keys,
/// positive dimensions, quality within 0–100.
pub fn validate_variants(
    variants: &[VariantSpec],
    thumbnail: &VariantSpec,
) -> Result<(), ConversionError> {
    let mut seen = HashSet::new();
    for spec in variants.iter().chain(std::iter::once(thumbnail)) {
        let key = spec.key.trim();
        check_path_segment("variant key", key)?;
        if !seen.insert(key) {
            return Err(ConversionError::Validation(format!(
                "duplicate variant key '{key}'"
            )));
        }
        if spec.width == 0 {
            return Err(ConversionError::Validation(format!(
                "variant '{key}' width must be > 0"
            )));
        }
        if spec.height == Some(0) {
            return Err(ConversionError::Validation(format!(
                "variant '{key}' height must be > 0"
            )));
        }
        if spec.quality > 100 {
            return Err(ConversionError::Validation(format!(
                "variant '{key}' quality must be 0–100, got {}",
                spec.quality
            )));
        }
    }
    Ok(())
}

/// Configuration for the conversion pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2webp::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(200)
///     .concurrency(8)
///     .default_bucket("magazines")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rasterizer resolution. Range: 72–600. Default: 300.
    ///
    /// 300 DPI gives the `high` variant enough source pixels on A4/Letter
    /// pages (≈2480 px wide) that it is a downscale, never an upscale.
    pub dpi: u32,

    /// Number of pages rendered and uploaded at once. Default: 4.
    ///
    /// WebP encoding is CPU-bound and every page issues V+1 uploads, so this
    /// bounds both local CPU and the request rate against the storage backend.
    pub concurrency: usize,

    /// Executable used to rasterise PDFs. Default: `pdftoppm`.
    pub rasterizer_command: String,

    /// Bucket used when a request does not name one. Default: `editions`.
    pub default_bucket: String,

    /// Variant ladder used when a request does not supply `variants`.
    pub default_variants: Vec<VariantSpec>,

    /// Thumbnail used when a request does not supply `thumbnail`.
    pub default_thumbnail: VariantSpec,

    /// Source download timeout in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-upload timeout in seconds. Default: 60.
    pub upload_timeout_secs: u64,

    /// Rasterizer subprocess timeout in seconds. Default: 300.
    pub rasterize_timeout_secs: u64,

    /// Directory under which per-request work directories are created.
    /// `None` uses the system temp directory.
    pub work_root: Option<PathBuf>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            concurrency: 4,
            rasterizer_command: "pdftoppm".to_string(),
            default_bucket: "editions".to_string(),
            default_variants: default_variants(),
            default_thumbnail: default_thumbnail(),
            download_timeout_secs: 120,
            upload_timeout_secs: 60,
            rasterize_timeout_secs: 300,
            work_root: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("concurrency", &self.concurrency)
            .field("rasterizer_command", &self.rasterizer_command)
            .field("default_bucket", &self.default_bucket)
            .field("default_variants", &self.default_variants)
            .field("default_thumbnail", &self.default_thumbnail)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("rasterize_timeout_secs", &self.rasterize_timeout_secs)
            .field("work_root", &self.work_root)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn rasterizer_command(mut self, command: impl Into<String>) -> Self {
        self.config.rasterizer_command = command.into();
        self
    }

    pub fn default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.default_bucket = bucket.into();
        self
    }

    pub fn default_variants(mut self, variants: Vec<VariantSpec>) -> Self {
        self.config.default_variants = variants;
        self
    }

    pub fn default_thumbnail(mut self, thumbnail: VariantSpec) -> Self {
        self.config.default_thumbnail = thumbnail;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn rasterize_timeout_secs(mut self, secs: u64) -> Self {
        self.config.rasterize_timeout_secs = secs;
        self
    }

    pub fn work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_root = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ConversionError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ConversionError::Validation(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(ConversionError::Validation(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.rasterizer_command.trim().is_empty() {
            return Err(ConversionError::Validation(
                "Rasterizer command must not be empty".into(),
            ));
        }
        if c.default_bucket.trim().is_empty() {
            return Err(ConversionError::Validation(
                "Default bucket must not be empty".into(),
            ));
        }
        validate_variants(&c.default_variants, &c.default_thumbnail)?;
        Ok(self.config)
    }
}
