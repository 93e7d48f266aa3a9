//! PDF rasterisation via an external command-line tool.
//!
//! The default adapter drives poppler's `pdftoppm`, which writes one PNG per
//! page named `{prefix}-{N}.png`. The width of `N` depends on the page count
//! (`page-1.png` for short documents, `page-01.png` or `page-001.png` for
//! longer ones), so page order is recovered by parsing the number rather than
//! sorting names: lexicographically `page-10.png` sorts before `page-9.png`.
//!
//! Page numbers handed downstream are 1..=N in that numeric order. They come
//! from the sort alone, never from metadata inside the PDF.

use crate::config::PipelineConfig;
use crate::error::ConversionError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Output prefix passed to the rasterizer.
pub const PAGE_PREFIX: &str = "page";

/// Longest stderr excerpt kept in a rasterization error.
const MAX_STDERR: usize = 500;

static PAGE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page-(\d+)\.png$").unwrap());

/// One rasterised page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    /// 1-indexed, contiguous.
    pub page_number: usize,
    pub path: PathBuf,
}

/// Turns a PDF on disk into ordered page images inside `out_dir`.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(
        &self,
        pdf: &Path,
        out_dir: &Path,
    ) -> Result<Vec<RasterPage>, ConversionError>;
}

/// `pdftoppm -r {dpi} -png {pdf} {out_dir}/page`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    command: String,
    dpi: u32,
    timeout_secs: u64,
}

impl PdftoppmRasterizer {
    pub fn new(command: impl Into<String>, dpi: u32, timeout_secs: u64) -> Self {
        Self {
            command: command.into(),
            dpi,
            timeout_secs,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.rasterizer_command.clone(),
            config.dpi,
            config.rasterize_timeout_secs,
        )
    }

    /// Whether the configured command can be spawned at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("-v")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok()
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(
        &self,
        pdf: &Path,
        out_dir: &Path,
    ) -> Result<Vec<RasterPage>, ConversionError> {
        let prefix = out_dir.join(PAGE_PREFIX);
        info!(
            "Rasterising {} at {} DPI with '{}'",
            pdf.display(),
            self.dpi,
            self.command
        );

        let mut cmd = Command::new(&self.command);
        cmd.arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(&prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output =
            match tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output()).await
            {
                Err(_) => {
                    return Err(ConversionError::Rasterization {
                        detail: format!(
                            "'{}' timed out after {}s",
                            self.command, self.timeout_secs
                        ),
                    })
                }
                Ok(Err(e)) => {
                    return Err(ConversionError::Rasterization {
                        detail: format!(
                            "could not run '{}': {e} (is poppler-utils installed?)",
                            self.command
                        ),
                    })
                }
                Ok(Ok(output)) => output,
            };

        if !output.status.success() {
            return Err(ConversionError::Rasterization {
                detail: format!(
                    "'{}' exited with {}: {}",
                    self.command,
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            });
        }

        let source_name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf.display().to_string());
        collect_pages(out_dir, &source_name).await
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "no output on stderr".to_string();
    }
    let start = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| text.len() - i <= MAX_STDERR)
        .unwrap_or(0);
    text[start..].to_string()
}

/// Numeric page index embedded in a rasterizer output file name.
pub fn page_index(file_name: &str) -> Option<u64> {
    PAGE_FILE
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// List `dir`, keep rasterizer page files, and number them 1..=N in numeric
/// order.
///
/// Fails with [`ConversionError::NoPagesProduced`] when nothing matches.
pub async fn collect_pages(
    dir: &Path,
    source_name: &str,
) -> Result<Vec<RasterPage>, ConversionError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConversionError::Internal(format!("Failed to list {}: {e}", dir.display())))?;

    let mut found: Vec<(u64, PathBuf)> = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConversionError::Internal(format!("Failed to list {}: {e}", dir.display())))?
    {
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(page_index) {
            found.push((index, entry.path()));
        }
    }

    if found.is_empty() {
        return Err(ConversionError::NoPagesProduced {
            source_name: source_name.to_string(),
        });
    }

    found.sort_by_key(|(index, _)| *index);
    let pages: Vec<RasterPage> = found
        .into_iter()
        .enumerate()
        .map(|(i, (_, path))| RasterPage {
            page_number: i + 1,
            path,
        })
        .collect();

    debug!("Rasterizer produced {} pages", pages.len());
    Ok(pages)
}
