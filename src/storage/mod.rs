//! Object-storage capability consumed by the asset publisher.
//!
//! The pipeline only needs two things from a storage service: write a byte
//! buffer to a bucket path (overwriting whatever was there), and turn a bucket
//! path into a public URL. [`ObjectStorage`] captures exactly that, so any
//! backend exposing the contract is substitutable.
//!
//! Credentials arrive with each request, so the pipeline holds a
//! [`StorageProvider`] and opens a backend per conversion.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SupabaseStorage`] | Supabase-compatible storage REST API over reqwest |
//! | [`MemoryStorage`]   | in-process map for tests and dry runs |

mod memory;
mod supabase;

pub use memory::{MemoryStorage, StoredObject};
pub use supabase::{SupabaseProvider, SupabaseStorage};

use crate::request::StorageCredentials;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The service answered with a non-success status.
    #[error("storage rejected the request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The request never got a response.
    #[error("storage request failed: {0}")]
    Transport(String),

    /// The request exceeded the configured timeout.
    #[error("storage request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Endpoint or key unusable.
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),
}

/// Write access to an object store plus public URL resolution.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path` inside `bucket`. With `upsert` an existing
    /// object is replaced; without it an existing object is an error.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError>;

    /// Public URL of `path` inside `bucket`. Pure; no network round trip.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Opens an [`ObjectStorage`] for the credentials carried by a request.
pub trait StorageProvider: Send + Sync {
    fn open(&self, credentials: &StorageCredentials)
        -> Result<Arc<dyn ObjectStorage>, StorageError>;
}
