//! Pipeline orchestration: one request in, one published edition out.
//!
//! ```text
//! Received → Validated → Downloaded → Rasterized
//!          → [per page: Rendered → Published]*   (bounded, unordered)
//!          → ManifestBuilt → ManifestPublished → Completed
//! ```
//!
//! Any step can fail; every failure aborts the whole request and no manifest
//! is published. The per-request work directory is a [`WorkDir`] guard, so it
//! is removed on success, on error, and when page processing panics.
//!
//! Pages are independent, so they are rendered and uploaded through a bounded
//! `buffer_unordered` pool. Completion order is arbitrary; entries are
//! re-sorted by page number before the manifest is built.

use crate::config::{PipelineConfig, VariantSpec};
use crate::error::ConversionError;
use crate::output::{ConversionResult, ConversionStats, PageManifestEntry};
use crate::pipeline::input::{HttpFetcher, SourceFetcher};
use crate::pipeline::manifest::{build_manifest, ManifestContext};
use crate::pipeline::publish::AssetPublisher;
use crate::pipeline::rasterize::{PdftoppmRasterizer, RasterPage, Rasterizer};
use crate::pipeline::variant::render_page;
use crate::request::ConversionRequest;
use crate::storage::{StorageProvider, SupabaseProvider};
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Scoped per-request work directory.
///
/// Removed when dropped. Removal failures are logged and never surface as
/// the conversion's result.
pub struct WorkDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl WorkDir {
    /// Create a fresh directory under `root`, or under the system temp dir.
    pub fn create(root: Option<&Path>) -> Result<Self, ConversionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pdf2webp-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| ConversionError::Internal(format!("Failed to create work directory: {e}")))?;

        let path = dir.path().to_path_buf();
        debug!("Created work directory {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed work directory {}", self.path.display()),
                Err(e) => warn!(
                    "Failed to remove work directory {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

/// The conversion pipeline with its collaborators.
///
/// Cheap to share behind an `Arc`; holds no per-request state.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn SourceFetcher>,
    rasterizer: Arc<dyn Rasterizer>,
    storage: Arc<dyn StorageProvider>,
}

impl Pipeline {
    /// Pipeline with the default collaborators: HTTP fetcher, `pdftoppm`,
    /// Supabase-compatible storage.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            fetcher: Arc::new(HttpFetcher::new(config.download_timeout_secs)),
            rasterizer: Arc::new(PdftoppmRasterizer::from_config(&config)),
            storage: Arc::new(SupabaseProvider::new(config.upload_timeout_secs)),
            config,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageProvider>) -> Self {
        self.storage = storage;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert one PDF edition and publish its assets and manifest.
    ///
    /// # Errors
    /// Every failure is fatal; see [`ConversionError`] for the taxonomy.
    /// Assets uploaded before a failure remain in storage.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        let total_start = Instant::now();

        // ── Step 1: Validate ─────────────────────────────────────────────────
        let request = request.validate(&self.config)?;
        let edition_id = request.edition_id.as_str();
        info!(edition_id, "Starting conversion: {}", request.pdf_url);

        let storage = self
            .storage
            .open(&request.credentials)
            .map_err(|e| ConversionError::Validation(e.to_string()))?;
        let publisher = AssetPublisher::new(storage, request.bucket.clone());

        // ── Step 2: Stage source ─────────────────────────────────────────────
        let work = WorkDir::create(self.config.work_root.as_deref())?;
        let download_start = Instant::now();
        let pdf = self.fetcher.fetch(&request.pdf_url, work.path()).await?;
        let download_duration_ms = download_start.elapsed().as_millis() as u64;

        // ── Step 3: Rasterise ────────────────────────────────────────────────
        let pages_dir = work.path().join("pages");
        tokio::fs::create_dir(&pages_dir)
            .await
            .map_err(|e| ConversionError::Internal(format!("Failed to create page directory: {e}")))?;

        let rasterize_start = Instant::now();
        let pages = self.rasterizer.rasterize(&pdf, &pages_dir).await?;
        let rasterize_duration_ms = rasterize_start.elapsed().as_millis() as u64;
        let total_pages = pages.len();
        info!("Rasterised {} pages in {}ms", total_pages, rasterize_duration_ms);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(total_pages);
        }

        // ── Step 4: Render + publish pages ───────────────────────────────────
        let specs = Arc::new(request.all_specs());
        let pages_start = Instant::now();
        let mut entries = self
            .process_pages(edition_id, &publisher, pages, &specs)
            .await?;
        entries.sort_by_key(|e| e.page_number);
        let pages_duration_ms = pages_start.elapsed().as_millis() as u64;

        let uploads = flatten_uploads(&entries, &specs);
        info!(
            "Published {} assets for {} pages in {}ms",
            uploads.len(),
            total_pages,
            pages_duration_ms
        );

        // ── Step 5: Manifest ─────────────────────────────────────────────────
        let manifest = build_manifest(
            ManifestContext {
                edition_id,
                bucket: publisher.bucket(),
                assets_base_url: publisher.public_url(edition_id),
                thumbnail_key: &request.thumbnail.key,
                generated_at: Utc::now(),
            },
            &entries,
        );
        let manifest_record = publisher.publish_manifest(&manifest).await?;
        debug!("Manifest published to {}", manifest_record.storage_path);

        // ── Step 6: Cleanup ──────────────────────────────────────────────────
        drop(work);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_complete(total_pages, uploads.len());
        }

        let stats = ConversionStats {
            download_duration_ms,
            rasterize_duration_ms,
            pages_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Conversion of '{}' complete: {} pages, {}ms total",
            edition_id, total_pages, stats.total_duration_ms
        );

        Ok(ConversionResult {
            success: true,
            edition_id: request.edition_id.clone(),
            total_pages,
            bucket: request.bucket.clone(),
            pages: entries,
            uploads,
            manifest_path: manifest_record.storage_path,
            manifest_url: manifest_record.public_url,
            manifest,
            stats,
        })
    }

    /// Synchronous wrapper around [`Pipeline::convert`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn convert_sync(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ConversionError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.convert(request))
    }

    /// Render and publish pages concurrently, at most `concurrency` at a time.
    ///
    /// The first failure stops the stream; pages still in flight are dropped.
    async fn process_pages(
        &self,
        edition_id: &str,
        publisher: &AssetPublisher,
        pages: Vec<RasterPage>,
        specs: &Arc<Vec<VariantSpec>>,
    ) -> Result<Vec<PageManifestEntry>, ConversionError> {
        let total_pages = pages.len();
        let callback = self.config.progress_callback.clone();

        stream::iter(pages.into_iter().map(|page| {
            let specs = Arc::clone(specs);
            let callback = callback.clone();
            async move {
                let page_num = page.page_number;
                if let Some(ref cb) = callback {
                    cb.on_page_start(page_num, total_pages);
                }
                let result = process_page(edition_id, publisher, page, specs).await;
                if let Some(ref cb) = callback {
                    match &result {
                        Ok(entry) => cb.on_page_complete(page_num, total_pages, entry.assets.len()),
                        Err(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
                    }
                }
                result
            }
        }))
        .buffer_unordered(self.config.concurrency)
        .try_collect()
        .await
    }
}

/// Render every variant of one page off the async runtime, then upload.
async fn process_page(
    edition_id: &str,
    publisher: &AssetPublisher,
    page: RasterPage,
    specs: Arc<Vec<VariantSpec>>,
) -> Result<PageManifestEntry, ConversionError> {
    let page_num = page.page_number;
    let rendered = tokio::task::spawn_blocking(move || render_page(&page, &specs))
        .await
        .map_err(|e| ConversionError::Render {
            page: page_num,
            variant: "*".to_string(),
            detail: format!("render task panicked: {e}"),
        })??;

    publisher.publish_page(edition_id, rendered).await
}

/// Storage paths of every page asset, page order then spec order.
fn flatten_uploads(entries: &[PageManifestEntry], specs: &[VariantSpec]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| {
            specs
                .iter()
                .filter_map(move |spec| entry.path_of(&spec.key).map(str::to_string))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::AssetRecord;
    use std::collections::BTreeMap;

    #[test]
    fn work_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let work = WorkDir::create(Some(root.path())).unwrap();
        let path = work.path().to_path_buf();
        std::fs::write(path.join("source.pdf"), b"%PDF").unwrap();
        assert!(path.exists());

        drop(work);
        assert!(!path.exists());
    }

    #[test]
    fn work_dir_is_removed_on_panic() {
        let root = tempfile::tempdir().unwrap();
        let root_path = root.path().to_path_buf();
        let result = std::panic::catch_unwind(move || {
            let work = WorkDir::create(Some(&root_path)).unwrap();
            std::fs::write(work.path().join("page-1.png"), b"").unwrap();
            panic!("page processing blew up");
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn uploads_follow_spec_order() {
        let mut assets = BTreeMap::new();
        for key in ["high", "low", "thumbnail"] {
            assets.insert(
                key.to_string(),
                AssetRecord {
                    storage_path: format!("e/pages/{key}/001.webp"),
                    public_url: String::new(),
                },
            );
        }
        let entries = vec![PageManifestEntry {
            page_number: 1,
            width: 1,
            height: 1,
            assets,
        }];
        let specs = vec![
            VariantSpec::new("low", 1, 1),
            VariantSpec::new("high", 1, 1),
            VariantSpec::new("thumbnail", 1, 1),
        ];
        assert_eq!(
            flatten_uploads(&entries, &specs),
            vec![
                "e/pages/low/001.webp",
                "e/pages/high/001.webp",
                "e/pages/thumbnail/001.webp"
            ]
        );
    }
}
