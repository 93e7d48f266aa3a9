//! Supabase-compatible storage REST backend.
//!
//! Uploads go to `POST {url}/storage/v1/object/{bucket}/{path}` with the
//! service key as both bearer token and `apikey`, and `x-upsert: true` for
//! overwrites. Public objects are served from
//! `{url}/storage/v1/object/public/{bucket}/{path}`, so the public URL is
//! computed locally.

use super::{ObjectStorage, StorageError, StorageProvider};
use crate::request::StorageCredentials;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest response body kept in a [`StorageError::Rejected`].
const MAX_ERROR_BODY: usize = 300;

/// One storage endpoint bound to one key.
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: Url,
    key: String,
    timeout_secs: u64,
}

impl SupabaseStorage {
    pub fn new(credentials: &StorageCredentials, timeout_secs: u64) -> Result<Self, StorageError> {
        let base_url = Url::parse(&credentials.url).map_err(|e| {
            StorageError::InvalidConfig(format!("storage URL '{}': {e}", credentials.url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidConfig(format!(
                "storage URL '{}' must be http(s)",
                credentials.url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            key: credentials.key.clone(),
            timeout_secs,
        })
    }

    /// `{base}/storage/v1/object[/public]/{bucket}/{path}` with each segment
    /// percent-encoded.
    fn object_url(&self, public: bool, bucket: &str, path: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["storage", "v1", "object"]);
            if public {
                segments.push("public");
            }
            segments.push(bucket).extend(path.split('/'));
        }
        url
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        let url = self.object_url(false, bucket, path);
        let len = bytes.len();

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.key))
            .header("apikey", &self.key)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StorageError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    StorageError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Uploaded {}/{} ({} bytes)", bucket, path, len);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.object_url(true, bucket, path).to_string()
    }
}

/// Opens a [`SupabaseStorage`] per request.
#[derive(Debug, Clone)]
pub struct SupabaseProvider {
    timeout_secs: u64,
}

impl SupabaseProvider {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

impl StorageProvider for SupabaseProvider {
    fn open(
        &self,
        credentials: &StorageCredentials,
    ) -> Result<Arc<dyn ObjectStorage>, StorageError> {
        Ok(Arc::new(SupabaseStorage::new(credentials, self.timeout_secs)?))
    }
}
