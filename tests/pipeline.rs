//! Integration tests for the conversion pipeline.
//!
//! The fetcher and rasterizer are replaced by fakes that write real PNGs, and
//! storage is `MemoryStorage`, so everything except `pdftoppm` itself runs
//! for real: decoding, resizing, WebP encoding, path layout, manifest.
//!
//! `real_pdftoppm_two_pages` needs poppler-utils and skips itself otherwise.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use pdf2webp::pipeline::input::{HttpFetcher, SourceFetcher, SOURCE_FILE_NAME};
use pdf2webp::pipeline::rasterize::{collect_pages, PdftoppmRasterizer, RasterPage, Rasterizer};
use pdf2webp::{
    ConversionError, ConversionProgressCallback, ConversionRequest, ErrorKind, MemoryStorage,
    Pipeline, PipelineConfig, VariantSpec,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, _source: &str, dest_dir: &Path) -> Result<PathBuf, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = dest_dir.join(SOURCE_FILE_NAME);
        tokio::fs::write(&path, b"%PDF-1.4 fake")
            .await
            .map_err(|e| ConversionError::Internal(e.to_string()))?;
        Ok(path)
    }
}

/// Writes `pages` PNGs named like `pdftoppm` output.
#[derive(Default)]
struct FakeRasterizer {
    pages: usize,
    corrupt_page: Option<usize>,
    fail: bool,
    seen_pdf: Mutex<Option<PathBuf>>,
}

impl FakeRasterizer {
    fn with_pages(pages: usize) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(
        &self,
        pdf: &Path,
        out_dir: &Path,
    ) -> Result<Vec<RasterPage>, ConversionError> {
        *self.seen_pdf.lock().unwrap() = Some(pdf.to_path_buf());
        if self.fail {
            return Err(ConversionError::Rasterization {
                detail: "pdftoppm exited with status 1".into(),
            });
        }
        for n in 1..=self.pages {
            let path = out_dir.join(format!("page-{n}.png"));
            if self.corrupt_page == Some(n) {
                std::fs::write(&path, b"not a png").unwrap();
            } else {
                RgbImage::from_fn(300, 400, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, n as u8]))
                    .save(&path)
                    .unwrap();
            }
        }
        collect_pages(out_dir, "source.pdf").await
    }
}

#[derive(Default)]
struct CountingCallback {
    started: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    uploads: AtomicUsize,
}

impl ConversionProgressCallback for CountingCallback {
    fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _assets: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_conversion_start(&self, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_conversion_complete(&self, _total_pages: usize, uploads: usize) {
        self.uploads.store(uploads, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Harness {
    pipeline: Pipeline,
    store: MemoryStorage,
    fetcher: Arc<FakeFetcher>,
    rasterizer: Arc<FakeRasterizer>,
    work_root: tempfile::TempDir,
}

fn harness(rasterizer: FakeRasterizer) -> Harness {
    harness_with(rasterizer, |b| b)
}

fn harness_with(
    rasterizer: FakeRasterizer,
    configure: impl FnOnce(pdf2webp::PipelineConfigBuilder) -> pdf2webp::PipelineConfigBuilder,
) -> Harness {
    let work_root = tempfile::tempdir().unwrap();
    let config = configure(PipelineConfig::builder().work_root(work_root.path()))
        .build()
        .unwrap();
    let store = MemoryStorage::with_base_url("https://cdn.test");
    let fetcher = Arc::new(FakeFetcher::default());
    let rasterizer = Arc::new(rasterizer);
    let pipeline = Pipeline::new(config)
        .with_fetcher(fetcher.clone())
        .with_rasterizer(rasterizer.clone())
        .with_storage(Arc::new(store.clone()));
    Harness {
        pipeline,
        store,
        fetcher,
        rasterizer,
        work_root,
    }
}

fn request(edition_id: &str) -> ConversionRequest {
    ConversionRequest {
        edition_id: edition_id.into(),
        pdf_url: "https://example.com/edition.pdf".into(),
        storage_url: "https://storage.test".into(),
        storage_key: "service-key".into(),
        ..Default::default()
    }
}

fn stored_manifest(store: &MemoryStorage, bucket: &str, edition_id: &str) -> Value {
    let obj = store
        .object(bucket, &format!("{edition_id}/manifest.json"))
        .expect("manifest uploaded");
    assert_eq!(obj.content_type, "application/json");
    serde_json::from_slice(&obj.bytes).unwrap()
}

fn work_root_is_empty(h: &Harness) -> bool {
    std::fs::read_dir(h.work_root.path()).unwrap().count() == 0
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_pages_default_variants() {
    let h = harness(FakeRasterizer::with_pages(2));
    let result = h.pipeline.convert(&request("ed-1")).await.unwrap();

    assert!(result.success);
    assert_eq!(result.total_pages, 2);
    assert_eq!(result.pages.len(), 2);
    assert_eq!(result.bucket, "editions");
    assert_eq!(result.uploads.len(), 8);
    assert!(!result.uploads.contains(&result.manifest_path));
    assert_eq!(result.manifest_path, "ed-1/manifest.json");
    assert_eq!(result.manifest_url, "https://cdn.test/editions/ed-1/manifest.json");

    assert_eq!(
        &result.uploads[..4],
        &[
            "ed-1/pages/low/001.webp",
            "ed-1/pages/medium/001.webp",
            "ed-1/pages/high/001.webp",
            "ed-1/pages/thumbnail/001.webp",
        ]
    );

    // 8 page assets + manifest
    assert_eq!(h.store.len(), 9);
    let obj = h.store.object("editions", "ed-1/pages/high/002.webp").unwrap();
    assert_eq!(obj.content_type, "image/webp");
    assert_eq!(&obj.bytes[..4], b"RIFF");

    let manifest = stored_manifest(&h.store, "editions", "ed-1");
    assert_eq!(manifest["totalPages"], 2);
    assert_eq!(manifest["assetsBaseUrl"], "https://cdn.test/editions/ed-1");
    let page1 = &manifest["pages"][0];
    assert_eq!(page1["pageNumber"], 1);
    assert_eq!(page1["width"], 300);
    for field in ["lowResImagePath", "mediumImagePath", "highResImagePath", "thumbnailPath"] {
        assert!(page1[field].is_string(), "{field} missing: {page1}");
    }
    assert_eq!(page1["thumbnailPath"], "ed-1/pages/thumbnail/001.webp");

    // The response carries the same manifest that was uploaded.
    let response = serde_json::to_value(&result).unwrap();
    assert_eq!(response["manifest"], manifest);
    assert_eq!(response["manifest"]["assetsBaseUrl"], "https://cdn.test/editions/ed-1");
    assert!(response["manifest"]["generatedAt"].is_string());
    assert_eq!(
        response["manifest"]["pages"][1]["lowResImagePath"],
        "ed-1/pages/low/002.webp"
    );
    assert_eq!(result.manifest.pages.len(), 2);

    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(work_root_is_empty(&h), "work directory left behind");
}

#[tokio::test]
async fn rerun_overwrites_same_paths() {
    let h = harness(FakeRasterizer::with_pages(2));
    let first = h.pipeline.convert(&request("ed-2")).await.unwrap();
    let paths_after_first = h.store.paths("editions");

    let second = h.pipeline.convert(&request("ed-2")).await.unwrap();
    assert_eq!(first.uploads, second.uploads);
    assert_eq!(h.store.paths("editions"), paths_after_first);
    assert_eq!(h.store.len(), 9);
    assert_eq!(h.store.upload_count(), 18);
}

#[tokio::test]
async fn pages_sorted_numerically_past_nine() {
    let h = harness_with(FakeRasterizer::with_pages(12), |b| b.concurrency(5));
    let mut req = request("ed-12");
    req.variants = Some(vec![VariantSpec::new("low", 100, 50)]);
    req.thumbnail = Some(VariantSpec::new("thumbnail", 30, 50).with_height(40));

    let result = h.pipeline.convert(&req).await.unwrap();
    let numbers: Vec<usize> = result.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, (1..=12).collect::<Vec<_>>());
    assert_eq!(result.uploads.len(), 24);
    assert_eq!(result.uploads[18], "ed-12/pages/low/010.webp");

    let manifest = stored_manifest(&h.store, "editions", "ed-12");
    assert_eq!(manifest["pages"][9]["pageNumber"], 10);
    assert_eq!(manifest["pages"][11]["lowResImagePath"], "ed-12/pages/low/012.webp");
}

#[tokio::test]
async fn custom_ladder_uses_fallbacks() {
    let h = harness(FakeRasterizer::with_pages(1));
    let mut req = request("ed-3");
    req.bucket = Some("magazines".into());
    req.variants = Some(vec![
        VariantSpec::new("medium", 200, 70),
        VariantSpec::new("high", 280, 80),
    ]);
    req.thumbnail = Some(VariantSpec::new("tiny", 60, 60).with_height(80));

    let result = h.pipeline.convert(&req).await.unwrap();
    assert_eq!(result.bucket, "magazines");
    assert_eq!(result.uploads.len(), 3);
    assert!(h.store.paths("editions").is_empty());

    let manifest = stored_manifest(&h.store, "magazines", "ed-3");
    let page = &manifest["pages"][0];
    assert_eq!(page["lowResImagePath"], page["mediumImagePath"]);
    assert_eq!(page["lowResImagePath"], "ed-3/pages/medium/001.webp");
    assert_eq!(page["thumbnailPath"], "ed-3/pages/tiny/001.webp");
}

#[tokio::test]
async fn progress_events_are_reported() {
    let cb = Arc::new(CountingCallback::default());
    let cb_dyn: pdf2webp::ProgressCallback = cb.clone();
    let h = harness_with(FakeRasterizer::with_pages(3), |b| b.progress_callback(cb_dyn));

    h.pipeline.convert(&request("ed-4")).await.unwrap();
    assert_eq!(cb.started.load(Ordering::SeqCst), 1);
    assert_eq!(cb.completed.load(Ordering::SeqCst), 3);
    assert_eq!(cb.errors.load(Ordering::SeqCst), 0);
    assert_eq!(cb.uploads.load(Ordering::SeqCst), 12);
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn validation_failure_has_no_side_effects() {
    let h = harness(FakeRasterizer::with_pages(2));
    let mut req = request("ed-5");
    req.storage_key.clear();

    let err = h.pipeline.convert(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.open_count(), 0);
    assert!(h.store.is_empty());
    assert!(work_root_is_empty(&h));
}

#[tokio::test]
async fn rasterizer_failure_removes_work_dir() {
    let h = harness(FakeRasterizer {
        fail: true,
        ..Default::default()
    });

    let err = h.pipeline.convert(&request("ed-6")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rasterization);

    let pdf = h.rasterizer.seen_pdf.lock().unwrap().clone().unwrap();
    assert!(pdf.starts_with(h.work_root.path()));
    assert!(!pdf.exists());
    assert!(work_root_is_empty(&h));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn zero_pages_is_no_pages_produced() {
    let h = harness(FakeRasterizer::with_pages(0));
    let err = h.pipeline.convert(&request("ed-7")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoPagesProduced);
    assert!(work_root_is_empty(&h));
}

#[tokio::test]
async fn corrupt_page_aborts_without_manifest() {
    let h = harness_with(
        FakeRasterizer {
            pages: 3,
            corrupt_page: Some(2),
            ..Default::default()
        },
        |b| b.concurrency(1),
    );

    let err = h.pipeline.convert(&request("ed-8")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert!(err.to_string().contains("page 2"));
    assert!(h.store.object("editions", "ed-8/manifest.json").is_none());
    assert!(work_root_is_empty(&h));
}

#[tokio::test]
async fn upload_failure_names_path_and_skips_manifest() {
    let h = harness(FakeRasterizer::with_pages(2));
    h.store.fail_uploads_containing("/pages/high/002");

    let err = h.pipeline.convert(&request("ed-9")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upload);
    assert_eq!(err.failed_path(), Some("ed-9/pages/high/002.webp"));
    assert!(h.store.object("editions", "ed-9/manifest.json").is_none());
    assert!(work_root_is_empty(&h));
}

#[tokio::test]
async fn manifest_failure_is_manifest_error() {
    let h = harness(FakeRasterizer::with_pages(1));
    h.store.fail_uploads_containing("manifest.json");

    let err = h.pipeline.convert(&request("ed-10")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Manifest);
    assert_eq!(err.failed_path(), Some("ed-10/manifest.json"));
    // page assets stay behind
    assert_eq!(h.store.len(), 4);
}

#[test]
fn convert_sync_outside_runtime() {
    let h = harness(FakeRasterizer::with_pages(1));
    let result = h.pipeline.convert_sync(&request("ed-sync")).unwrap();
    assert_eq!(result.total_pages, 1);
}

// ── Real rasterizer ──────────────────────────────────────────────────────────

/// A valid PDF with `pages` blank 200×300 pt pages.
fn blank_pdf(pages: usize) -> Vec<u8> {
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages),
    ];
    for _ in 0..pages {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 300] >>".to_string());
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, obj).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

#[tokio::test]
async fn real_pdftoppm_two_pages() {
    if !PdftoppmRasterizer::new("pdftoppm", 72, 60).is_available().await {
        println!("SKIP: pdftoppm not installed");
        return;
    }

    let src = tempfile::tempdir().unwrap();
    let pdf = src.path().join("two.pdf");
    std::fs::write(&pdf, blank_pdf(2)).unwrap();

    let work_root = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .dpi(72)
        .work_root(work_root.path())
        .build()
        .unwrap();
    let store = MemoryStorage::new();
    let pipeline = Pipeline::new(config)
        .with_fetcher(Arc::new(HttpFetcher::new(30).with_local_paths()))
        .with_storage(Arc::new(store.clone()));

    let mut req = request("real");
    req.pdf_url = pdf.display().to_string();
    let result = pipeline.convert(&req).await.unwrap();

    assert_eq!(result.total_pages, 2);
    assert_eq!(result.uploads.len(), 8);
    assert_eq!(result.pages[0].width, 200);
    assert_eq!(store.len(), 9);
    assert_eq!(std::fs::read_dir(work_root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_rasterizer_is_rasterization_error() {
    let work_root = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .rasterizer_command("pdf2webp-no-such-rasterizer")
        .work_root(work_root.path())
        .build()
        .unwrap();
    let store = MemoryStorage::new();
    let pipeline = Pipeline::new(config)
        .with_fetcher(Arc::new(FakeFetcher::default()))
        .with_storage(Arc::new(store.clone()));

    let err = pipeline.convert(&request("ed-x")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rasterization);
    assert!(store.is_empty());
    assert_eq!(std::fs::read_dir(work_root.path()).unwrap().count(), 0);
}
