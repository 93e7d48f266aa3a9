//! Pipeline stages for PDF-to-WebP conversion.
//!
//! Each submodule implements exactly one step; [`crate::convert`] wires them
//! together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ variant ──▶ publish ──▶ manifest ──▶ publish
//! (URL)     (pdftoppm)    (WebP ×N)   (storage)   (JSON)       (storage)
//! ```
//!
//! 1. [`input`]     — stream the source PDF into the work directory
//! 2. [`rasterize`] — run the external rasterizer, order pages numerically
//! 3. [`variant`]   — decode each page once, resize + encode every variant;
//!    CPU-bound, runs under `spawn_blocking`
//! 4. [`publish`]   — deterministic storage paths, upsert uploads
//! 5. [`manifest`]  — per-page summaries with low/thumbnail fallbacks

pub mod input;
pub mod manifest;
pub mod publish;
pub mod rasterize;
pub mod variant;
