//! Error types for the pdf2webp library.
//!
//! Every failure in the page-conversion pipeline is fatal to the request, so
//! there is a single error enum, [`ConversionError`]. Each variant carries an
//! [`ErrorKind`] tag the boundary layer (HTTP server, CLI) maps to a status
//! code or exit behaviour without matching on every variant.
//!
//! Storage backends report their own [`crate::storage::StorageError`]; the
//! asset publisher wraps it into [`ConversionError::Upload`] or
//! [`ConversionError::Manifest`] together with the failing storage path.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// All errors returned by the pdf2webp library.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Request errors ────────────────────────────────────────────────────
    /// A required request field is missing or a field is out of range.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The shared-secret header was missing or did not match.
    #[error("Unauthorized: {0}")]
    Authorization(String),

    // ── Source errors ─────────────────────────────────────────────────────
    /// The source PDF could not be fetched.
    #[error("Failed to download '{url}': {reason}")]
    Download { url: String, reason: String },

    // ── Rasterizer errors ─────────────────────────────────────────────────
    /// The external rasterizer could not be run, exited non-zero, or timed out.
    #[error("Rasterization failed: {detail}")]
    Rasterization { detail: String },

    /// The rasterizer ran but produced no page images.
    #[error("No pages were produced from '{source_name}' (empty or corrupt PDF?)")]
    NoPagesProduced { source_name: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// Decoding, resizing, or encoding failed for one page/variant.
    #[error("Rendering page {page} variant '{variant}' failed: {detail}")]
    Render {
        page: usize,
        variant: String,
        detail: String,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Uploading a page asset failed.
    #[error("Upload of '{path}' failed: {detail}")]
    Upload { path: String, detail: String },

    /// Uploading the manifest failed.
    #[error("Manifest upload to '{path}' failed: {detail}")]
    Manifest { path: String, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (I/O on the work directory, task panics).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error category, stable across releases and safe to expose to
/// clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Download,
    Rasterization,
    NoPagesProduced,
    Render,
    Upload,
    Manifest,
    Internal,
}

impl ErrorKind {
    /// HTTP status code equivalent for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Authorization => 401,
            ErrorKind::Rasterization | ErrorKind::NoPagesProduced => 422,
            ErrorKind::Download | ErrorKind::Upload | ErrorKind::Manifest => 502,
            ErrorKind::Render | ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Download => "download",
            ErrorKind::Rasterization => "rasterization",
            ErrorKind::NoPagesProduced => "no_pages_produced",
            ErrorKind::Render => "render",
            ErrorKind::Upload => "upload",
            ErrorKind::Manifest => "manifest",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConversionError {
    /// The tag used by the boundary layer to pick a status code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::Validation(_) => ErrorKind::Validation,
            ConversionError::Authorization(_) => ErrorKind::Authorization,
            ConversionError::Download { .. } => ErrorKind::Download,
            ConversionError::Rasterization { .. } => ErrorKind::Rasterization,
            ConversionError::NoPagesProduced { .. } => ErrorKind::NoPagesProduced,
            ConversionError::Render { .. } => ErrorKind::Render,
            ConversionError::Upload { .. } => ErrorKind::Upload,
            ConversionError::Manifest { .. } => ErrorKind::Manifest,
            ConversionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The storage path that failed, for upload and manifest errors.
    pub fn failed_path(&self) -> Option<&str> {
        match self {
            ConversionError::Upload { path, .. } | ConversionError::Manifest { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_error_carries_path() {
        let e = ConversionError::Upload {
            path: "ed-1/pages/low/003.webp".into(),
            detail: "HTTP 500".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Upload);
        assert_eq!(e.failed_path(), Some("ed-1/pages/low/003.webp"));
        assert!(e.to_string().contains("ed-1/pages/low/003.webp"), "got: {e}");
    }

    #[test]
    fn render_error_display() {
        let e = ConversionError::Render {
            page: 7,
            variant: "thumbnail".into(),
            detail: "bad pixels".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 7"), "got: {msg}");
        assert!(msg.contains("thumbnail"), "got: {msg}");
        assert_eq!(e.failed_path(), None);
    }

    #[test]
    fn kinds_map_to_status_codes() {
        assert_eq!(ConversionError::Validation("x".into()).kind().status_code(), 400);
        assert_eq!(ConversionError::Authorization("x".into()).kind().status_code(), 401);
        assert_eq!(
            ConversionError::NoPagesProduced { source_name: "a.pdf".into() }
                .kind()
                .status_code(),
            422
        );
        assert_eq!(ConversionError::Internal("x".into()).kind().status_code(), 500);
    }

    #[test]
    fn kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NoPagesProduced).unwrap();
        assert_eq!(json, "\"no_pages_produced\"");
        assert_eq!(ErrorKind::NoPagesProduced.to_string(), "no_pages_produced");
    }
}
