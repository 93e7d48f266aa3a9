//! In-process storage backend.
//!
//! Clones share the same object map, so a test can hand one clone to the
//! pipeline as its [`StorageProvider`] and inspect what was written through
//! another.

use super::{ObjectStorage, StorageError, StorageProvider};
use crate::request::StorageCredentials;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// An object held by [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<(String, String), StoredObject>,
    uploads: usize,
    opened: usize,
    fail_paths_containing: Option<String>,
}

/// Thread-safe in-memory object store.
#[derive(Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
    base_url: String,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_base_url("memory://local")
    }

    /// Public URLs become `{base_url}/{bucket}/{path}`. One trailing `/` on
    /// `base_url` is dropped.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            state: Arc::new(Mutex::new(State::default())),
            base_url,
        }
    }

    /// Make every upload whose path contains `needle` fail.
    pub fn fail_uploads_containing(&self, needle: impl Into<String>) {
        self.lock().fail_paths_containing = Some(needle.into());
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Paths stored in `bucket`, sorted.
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Number of objects currently stored across all buckets.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful upload calls, overwrites included.
    pub fn upload_count(&self) -> usize {
        self.lock().uploads
    }

    /// Number of times the backend was opened through [`StorageProvider`].
    pub fn open_count(&self) -> usize {
        self.lock().opened
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        let mut state = self.lock();
        if let Some(needle) = &state.fail_paths_containing {
            if path.contains(needle.as_str()) {
                return Err(StorageError::Rejected {
                    status: 500,
                    body: format!("injected failure for '{path}'"),
                });
            }
        }

        let key = (bucket.to_string(), path.to_string());
        if !upsert && state.objects.contains_key(&key) {
            return Err(StorageError::Rejected {
                status: 409,
                body: "The resource already exists".into(),
            });
        }

        state.objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        state.uploads += 1;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, path)
    }
}

impl StorageProvider for MemoryStorage {
    fn open(
        &self,
        _credentials: &StorageCredentials,
    ) -> Result<Arc<dyn ObjectStorage>, StorageError> {
        self.lock().opened += 1;
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_overwrites_and_insert_conflicts() {
        let store = MemoryStorage::new();
        store
            .upload("b", "a/1.webp", vec![1], "image/webp", true)
            .await
            .unwrap();
        store
            .upload("b", "a/1.webp", vec![2], "image/webp", true)
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.upload_count(), 2);
        assert_eq!(store.object("b", "a/1.webp").unwrap().bytes, vec![2]);

        let err = store
            .upload("b", "a/1.webp", vec![3], "image/webp", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected { status: 409, .. }));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryStorage::with_base_url("https://cdn.test/");
        let handle = store
            .open(&StorageCredentials {
                url: "u".into(),
                key: "k".into(),
            })
            .unwrap();
        handle
            .upload("b", "x.json", b"{}".to_vec(), "application/json", true)
            .await
            .unwrap();
        assert_eq!(store.paths("b"), vec!["x.json".to_string()]);
        assert_eq!(store.open_count(), 1);
        assert_eq!(handle.public_url("b", "x.json"), "https://cdn.test/b/x.json");
    }

    #[test]
    fn base_url_keeps_scheme_separator() {
        assert_eq!(
            MemoryStorage::new().public_url("b", "e/manifest.json"),
            "memory://local/b/e/manifest.json"
        );
        assert_eq!(
            MemoryStorage::with_base_url("memory://dry-run/").public_url("b", "p"),
            "memory://dry-run/b/p"
        );
    }

    #[tokio::test]
    async fn injected_failure() {
        let store = MemoryStorage::new();
        store.fail_uploads_containing("/high/");
        let err = store
            .upload("b", "e/pages/high/001.webp", vec![], "image/webp", true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected"));
        assert!(store.is_empty());
    }
}
