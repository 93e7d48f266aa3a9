//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders and publishes each page. The CLI uses it to
//! drive a terminal progress bar; a server could forward the events to a job
//! table or a websocket.
//!
//! # Example
//!
//! ```rust
//! use pdf2webp::{ConversionProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     published: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, assets: usize) {
//!         self.published.fetch_add(assets, Ordering::SeqCst);
//!         eprintln!("Page {}/{} published", page_num, total_pages);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { published: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// Pages are processed concurrently, so `on_page_start`, `on_page_complete`
/// and `on_page_error` may be called from different tasks at the same time.
/// All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after rasterization, before any page is rendered.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page's variants start rendering.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when every asset of a page has been uploaded.
    ///
    /// * `assets` — number of assets published for this page
    fn on_page_complete(&self, page_num: usize, total_pages: usize, assets: usize) {
        let _ = (page_num, total_pages, assets);
    }

    /// Called when a page fails. The conversion aborts after this.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the manifest has been published.
    ///
    /// * `uploads` — number of page assets uploaded (manifest excluded)
    fn on_conversion_complete(&self, total_pages: usize, uploads: usize) {
        let _ = (total_pages, uploads);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
