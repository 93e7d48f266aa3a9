//! Inbound conversion request and its validation.
//!
//! A [`ConversionRequest`] is what a caller sends (JSON over HTTP, or built
//! by the CLI). [`ConversionRequest::validate`] checks the required fields,
//! fills in defaults from [`PipelineConfig`], and returns a
//! [`ValidatedRequest`] the orchestrator can run without further checks.
//! Validation touches neither the network nor the filesystem.

use crate::config::{check_path_segment, validate_variants, PipelineConfig, VariantSpec};
use crate::error::ConversionError;
use serde::Deserialize;
use std::fmt;

/// A request to convert one PDF edition.
///
/// Every field defaults when absent from the JSON body so that a missing
/// `editionId` surfaces as a [`ConversionError::Validation`] rather than a
/// deserialisation failure.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    /// Opaque edition identifier; the storage prefix for every asset.
    #[serde(default)]
    pub edition_id: String,

    /// Source PDF location (HTTP/HTTPS URL, or a local path from the CLI).
    #[serde(default)]
    pub pdf_url: String,

    /// Storage service endpoint.
    #[serde(default, alias = "supabaseUrl")]
    pub storage_url: String,

    /// Storage service key.
    #[serde(default, alias = "supabaseKey")]
    pub storage_key: String,

    /// Target bucket. Falls back to [`PipelineConfig::default_bucket`].
    #[serde(default)]
    pub bucket: Option<String>,

    /// Variant ladder. Falls back to [`PipelineConfig::default_variants`].
    #[serde(default)]
    pub variants: Option<Vec<VariantSpec>>,

    /// Thumbnail spec. Falls back to [`PipelineConfig::default_thumbnail`].
    #[serde(default)]
    pub thumbnail: Option<VariantSpec>,
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("edition_id", &self.edition_id)
            .field("pdf_url", &self.pdf_url)
            .field("storage_url", &self.storage_url)
            .field("storage_key", &redact(&self.storage_key))
            .field("bucket", &self.bucket)
            .field("variants", &self.variants)
            .field("thumbnail", &self.thumbnail)
            .finish()
    }
}

/// Endpoint and key used to open a storage backend for one request.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub url: String,
    pub key: String,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("url", &self.url)
            .field("key", &redact(&self.key))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// A request whose required fields are present and whose defaults are applied.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub edition_id: String,
    pub pdf_url: String,
    pub credentials: StorageCredentials,
    pub bucket: String,
    pub variants: Vec<VariantSpec>,
    pub thumbnail: VariantSpec,
}

impl ValidatedRequest {
    /// Every spec rendered per page: the variants in order, then the thumbnail.
    pub fn all_specs(&self) -> Vec<VariantSpec> {
        let mut specs = self.variants.clone();
        specs.push(self.thumbnail.clone());
        specs
    }
}

impl ConversionRequest {
    /// Check required fields and apply configured defaults.
    pub fn validate(&self, config: &PipelineConfig) -> Result<ValidatedRequest, ConversionError> {
        let edition_id = required("editionId", &self.edition_id)?;
        let pdf_url = required("pdfUrl", &self.pdf_url)?;
        let storage_url = required("storageUrl", &self.storage_url)?;
        let storage_key = required("storageKey", &self.storage_key)?;

        check_path_segment("editionId", &edition_id)?;

        let bucket = self
            .bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(&config.default_bucket)
            .to_string();

        let variants = self
            .variants
            .clone()
            .unwrap_or_else(|| config.default_variants.clone());
        let thumbnail = self
            .thumbnail
            .clone()
            .unwrap_or_else(|| config.default_thumbnail.clone());
        validate_variants(&variants, &thumbnail)?;

        Ok(ValidatedRequest {
            edition_id,
            pdf_url,
            credentials: StorageCredentials {
                url: storage_url.trim_end_matches('/').to_string(),
                key: storage_key,
            },
            bucket,
            variants,
            thumbnail,
        })
    }
}

fn required(field: &str, value: &str) -> Result<String, ConversionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ConversionError::Validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}
