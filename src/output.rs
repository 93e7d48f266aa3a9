//! Result types returned by a successful conversion.

use crate::pipeline::manifest::Manifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where one uploaded asset lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    /// Bucket-relative path, e.g. `ed-1/pages/low/001.webp`.
    pub storage_path: String,
    /// Publicly resolvable URL of the object.
    pub public_url: String,
}

/// All assets generated for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageManifestEntry {
    /// 1-indexed page number.
    pub page_number: usize,
    /// Natural width of the rasterised page in pixels.
    pub width: u32,
    /// Natural height of the rasterised page in pixels.
    pub height: u32,
    /// Variant key → uploaded asset.
    pub assets: BTreeMap<String, AssetRecord>,
}

impl PageManifestEntry {
    /// Storage path of the given variant, if it was generated for this page.
    pub fn path_of(&self, key: &str) -> Option<&str> {
        self.assets.get(key).map(|a| a.storage_path.as_str())
    }
}

/// Wall-clock timings for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    pub download_duration_ms: u64,
    pub rasterize_duration_ms: u64,
    pub pages_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Summary of a completed conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    /// Always `true`; failures use the error envelope instead.
    pub success: bool,
    pub edition_id: String,
    pub total_pages: usize,
    pub bucket: String,
    /// Per-page assets, ordered by page number.
    pub pages: Vec<PageManifestEntry>,
    /// Every page asset uploaded, in page order then variant order. The
    /// manifest is not included.
    pub uploads: Vec<String>,
    pub manifest_path: String,
    pub manifest_url: String,
    /// The manifest exactly as uploaded to `manifest_path`.
    pub manifest: Manifest,
    pub stats: ConversionStats,
}
