//! Asset publishing: deterministic storage paths and upserting uploads.
//!
//! Paths depend only on the edition id, variant key, and page number, so a
//! re-run of the same edition overwrites its previous assets instead of
//! duplicating them:
//!
//! ```text
//! {editionId}/pages/{variantKey}/{page:03}.webp
//! {editionId}/manifest.json
//! ```
//!
//! There is exactly one attempt per asset. A failed upload aborts the
//! conversion; assets already written stay in the bucket.

use crate::error::ConversionError;
use crate::output::{AssetRecord, PageManifestEntry};
use crate::pipeline::manifest::Manifest;
use crate::pipeline::variant::{RenderedPage, WEBP_CONTENT_TYPE};
use crate::storage::{ObjectStorage, StorageError};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Storage path of one page asset.
pub fn page_asset_path(edition_id: &str, variant_key: &str, page_number: usize) -> String {
    format!("{edition_id}/pages/{variant_key}/{page_number:03}.webp")
}

/// Storage path of an edition's manifest.
pub fn manifest_path(edition_id: &str) -> String {
    format!("{edition_id}/manifest.json")
}

/// Uploads assets for one conversion into one bucket.
#[derive(Clone)]
pub struct AssetPublisher {
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
}

impl AssetPublisher {
    pub fn new(storage: Arc<dyn ObjectStorage>, bucket: impl Into<String>) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn public_url(&self, path: &str) -> String {
        self.storage.public_url(&self.bucket, path)
    }

    /// Upsert `bytes` at `path` and resolve its public URL.
    pub async fn publish(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<AssetRecord, StorageError> {
        self.storage
            .upload(&self.bucket, path, bytes, content_type, true)
            .await?;
        Ok(AssetRecord {
            storage_path: path.to_string(),
            public_url: self.public_url(path),
        })
    }

    /// Upload every variant of a page concurrently.
    pub async fn publish_page(
        &self,
        edition_id: &str,
        page: RenderedPage,
    ) -> Result<PageManifestEntry, ConversionError> {
        let page_number = page.page_number;
        let uploads = page.variants.into_iter().map(|variant| {
            let path = page_asset_path(edition_id, &variant.key, page_number);
            async move {
                let record = self
                    .publish(&path, variant.bytes, WEBP_CONTENT_TYPE)
                    .await
                    .map_err(|e| ConversionError::Upload {
                        path: path.clone(),
                        detail: e.to_string(),
                    })?;
                Ok::<_, ConversionError>((variant.key, record))
            }
        });

        let assets: BTreeMap<String, AssetRecord> = try_join_all(uploads).await?.into_iter().collect();
        debug!("Page {}: published {} assets", page_number, assets.len());

        Ok(PageManifestEntry {
            page_number,
            width: page.width,
            height: page.height,
            assets,
        })
    }

    /// Serialise and upload the manifest to `{editionId}/manifest.json`.
    pub async fn publish_manifest(&self, manifest: &Manifest) -> Result<AssetRecord, ConversionError> {
        let path = manifest_path(&manifest.edition_id);
        let body = serde_json::to_vec_pretty(manifest)
            .map_err(|e| ConversionError::Internal(format!("Failed to serialise manifest: {e}")))?;

        self.publish(&path, body, "application/json")
            .await
            .map_err(|e| ConversionError::Manifest {
                path,
                detail: e.to_string(),
            })
    }
}
