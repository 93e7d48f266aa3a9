//! Source acquisition: stream the PDF into the request's work directory.
//!
//! The rasterizer is an external process that needs a file-system path, so
//! the source always lands on disk first. HTTP bodies are streamed chunk by
//! chunk instead of buffered, keeping memory flat for large editions.
//!
//! Local paths are only accepted when the fetcher is built with
//! [`HttpFetcher::with_local_paths`], which the CLI does. The default fetcher
//! behind the HTTP server refuses them, since a caller could otherwise have
//! server-local files rasterised and uploaded to storage of their choosing.
//! Accepted local files are copied so the work directory owns every file the
//! rasterizer touches and cleanup is uniform.

use crate::error::ConversionError;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// File name the source PDF is stored under inside the work directory.
pub const SOURCE_FILE_NAME: &str = "source.pdf";

/// Fetches a PDF into a directory and returns the local path.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, ConversionError>;
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Default fetcher: HTTP(S) GET streamed to disk, optionally a local copy.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout_secs: u64,
    local_paths: bool,
}

impl HttpFetcher {
    /// URL-only fetcher.
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            local_paths: false,
        }
    }

    /// Also accept local file paths. CLI only.
    pub fn with_local_paths(mut self) -> Self {
        self.local_paths = true;
        self
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, ConversionError> {
        let dest = dest_dir.join(SOURCE_FILE_NAME);
        if is_url(source) {
            download_url(source, &dest, self.timeout_secs).await?;
        } else if self.local_paths {
            copy_local(source, &dest).await?;
        } else {
            return Err(ConversionError::Validation(format!(
                "pdfUrl must be an http:// or https:// URL, got '{source}'"
            )));
        }
        Ok(dest)
    }
}

fn download_error(url: &str, reason: impl Into<String>) -> ConversionError {
    ConversionError::Download {
        url: url.to_string(),
        reason: reason.into(),
    }
}

fn map_reqwest(url: &str, e: reqwest::Error, timeout_secs: u64) -> ConversionError {
    if e.is_timeout() {
        download_error(url, format!("timed out after {timeout_secs}s"))
    } else {
        download_error(url, e.to_string())
    }
}

/// Stream `url` into `dest`.
async fn download_url(url: &str, dest: &Path, timeout_secs: u64) -> Result<(), ConversionError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_error(url, e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| map_reqwest(url, e, timeout_secs))?;

    if !response.status().is_success() {
        return Err(download_error(url, format!("HTTP {}", response.status())));
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| ConversionError::Internal(format!("Failed to create temp file: {e}")))?;

    let mut written: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| map_reqwest(url, e, timeout_secs))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ConversionError::Internal(format!("Failed to write temp file: {e}")))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| ConversionError::Internal(format!("Failed to flush temp file: {e}")))?;

    if written == 0 {
        return Err(download_error(url, "empty response body"));
    }

    info!("Downloaded {} bytes to: {}", written, dest.display());
    Ok(())
}

/// Copy a local PDF into the work directory.
async fn copy_local(path_str: &str, dest: &Path) -> Result<(), ConversionError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(download_error(path_str, "not a regular file")),
        Err(e) => return Err(download_error(path_str, e.to_string())),
    }

    tokio::fs::copy(&path, dest)
        .await
        .map_err(|e| download_error(path_str, e.to_string()))?;

    debug!("Copied local PDF {} → {}", path.display(), dest.display());
    Ok(())
}
