//! Manifest assembly.
//!
//! The manifest is what downstream readers fetch first: one summary per page
//! with a path for each resolution tier. Requests may customise the variant
//! ladder, so each summary field falls back independently:
//!
//! | Field | Source |
//! |-------|--------|
//! | `lowResImagePath`   | `low`, else `medium` |
//! | `mediumImagePath`   | `medium` |
//! | `highResImagePath`  | `high` |
//! | `thumbnailPath`     | the request's thumbnail key, else `low` |
//!
//! Missing fields serialise as `null`.

use crate::output::PageManifestEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LOW_KEY: &str = "low";
pub const MEDIUM_KEY: &str = "medium";
pub const HIGH_KEY: &str = "high";

/// The document uploaded to `{editionId}/manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub edition_id: String,
    pub total_pages: usize,
    pub bucket: String,
    /// Public URL of the `{editionId}` prefix.
    pub assets_base_url: String,
    pub generated_at: DateTime<Utc>,
    pub pages: Vec<PageSummary>,
}

/// Per-page paths after fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    pub low_res_image_path: Option<String>,
    pub medium_image_path: Option<String>,
    pub high_res_image_path: Option<String>,
    pub thumbnail_path: Option<String>,
}

/// Apply the fallback rules to one page.
pub fn summarize_page(entry: &PageManifestEntry, thumbnail_key: &str) -> PageSummary {
    let path = |key: &str| entry.path_of(key).map(str::to_string);
    PageSummary {
        page_number: entry.page_number,
        width: entry.width,
        height: entry.height,
        low_res_image_path: path(LOW_KEY).or_else(|| path(MEDIUM_KEY)),
        medium_image_path: path(MEDIUM_KEY),
        high_res_image_path: path(HIGH_KEY),
        thumbnail_path: path(thumbnail_key).or_else(|| path(LOW_KEY)),
    }
}

/// Inputs that are the same for every page of a manifest.
#[derive(Debug, Clone)]
pub struct ManifestContext<'a> {
    pub edition_id: &'a str,
    pub bucket: &'a str,
    pub assets_base_url: String,
    pub thumbnail_key: &'a str,
    pub generated_at: DateTime<Utc>,
}

/// Build the manifest from page entries already sorted by page number.
pub fn build_manifest(ctx: ManifestContext<'_>, pages: &[PageManifestEntry]) -> Manifest {
    Manifest {
        edition_id: ctx.edition_id.to_string(),
        total_pages: pages.len(),
        bucket: ctx.bucket.to_string(),
        assets_base_url: ctx.assets_base_url,
        generated_at: ctx.generated_at,
        pages: pages
            .iter()
            .map(|entry| summarize_page(entry, ctx.thumbnail_key))
            .collect(),
    }
}
