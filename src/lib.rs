//! # pdf2webp
//!
//! Turn a PDF edition (magazine issue, newspaper, catalogue) into
//! resolution-tiered WebP page images in object storage, plus a manifest a
//! page-flip reader loads first.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ConversionRequest
//!  │
//!  ├─ 1. Validate   required fields, defaults from PipelineConfig
//!  ├─ 2. Input      stream the PDF into a scoped work directory
//!  ├─ 3. Rasterize  external `pdftoppm` subprocess → page-N.png
//!  ├─ 4. Variants   resize + lossy WebP per spec (spawn_blocking, bounded pool)
//!  ├─ 5. Publish    {editionId}/pages/{key}/{NNN}.webp, upsert
//!  └─ 6. Manifest   {editionId}/manifest.json with per-page fallbacks
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2webp::{ConversionRequest, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(PipelineConfig::default());
//!     let request = ConversionRequest {
//!         edition_id: "2024-spring".into(),
//!         pdf_url: "https://example.com/spring.pdf".into(),
//!         storage_url: "https://project.supabase.co".into(),
//!         storage_key: std::env::var("STORAGE_KEY")?,
//!         ..Default::default()
//!     };
//!     let result = pipeline.convert(&request).await?;
//!     println!("{} pages → {}", result.total_pages, result.manifest_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum router exposing `POST /convert` and `GET /health` |
//! | `cli`    | on      | Enables the `pdf2webp` binary (clap + anyhow + tracing-subscriber) |
//!
//! The rasterizer is an external program (`pdftoppm` from poppler-utils by
//! default) and must be on `PATH` at run time.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, VariantSpec};
pub use convert::{Pipeline, WorkDir};
pub use error::{ConversionError, ErrorKind};
pub use output::{AssetRecord, ConversionResult, ConversionStats, PageManifestEntry};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use request::{ConversionRequest, StorageCredentials, ValidatedRequest};
pub use storage::{MemoryStorage, ObjectStorage, StorageError, StorageProvider};
