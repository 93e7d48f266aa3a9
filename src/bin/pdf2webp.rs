//! CLI binary for pdf2webp.
//!
//! `serve` runs the HTTP service; `convert` runs one conversion from the
//! terminal. Both map flags to `PipelineConfig` the same way.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2webp::pipeline::input::HttpFetcher;
use pdf2webp::pipeline::rasterize::PdftoppmRasterizer;
use pdf2webp::server::{router, AppState};
use pdf2webp::{
    ConversionProgressCallback, ConversionRequest, MemoryStorage, Pipeline, PipelineConfig,
    ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar plus one log line per finished page. Pages finish out of
/// order, so start times are tracked per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Fetching and rasterising PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, assets: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{assets} assets")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(error),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, uploads: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages, {} assets uploaded",
            green("✔"),
            bold(&total_pages.to_string()),
            uploads
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on :8080
  pdf2webp serve --api-secret "$API_SECRET"

  # Convert one edition and publish to storage
  pdf2webp convert spring.pdf --edition-id 2024-spring \
      --storage-url https://project.supabase.co --storage-key "$STORAGE_KEY"

  # Render everything, upload nothing
  pdf2webp convert https://example.com/spring.pdf --edition-id test --dry-run --json

ENVIRONMENT VARIABLES:
  PORT, API_SECRET                  serve defaults
  STORAGE_URL, STORAGE_KEY          storage endpoint and key
  STORAGE_BUCKET                    default bucket (editions)
  PDF2WEBP_DPI, PDF2WEBP_CONCURRENCY, PDF2WEBP_RASTERIZER, ...
  RUST_LOG                          log filter override

REQUIREMENTS:
  `pdftoppm` (poppler-utils) on PATH, or --rasterizer pointing at a
  compatible executable.
"#;

/// Rasterise PDF editions into WebP page tiers and publish them.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2webp",
    version,
    about = "Rasterise PDF editions into resolution-tiered WebP assets",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2WEBP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2WEBP_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve `POST /convert` and `GET /health`.
    Serve(ServeArgs),
    /// Convert a single PDF.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "PDF2WEBP_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Shared secret required in the x-api-secret header.
    #[arg(long, env = "API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local PDF path or HTTP/HTTPS URL.
    input: String,

    /// Edition identifier; prefix of every storage path.
    #[arg(long)]
    edition_id: String,

    /// Target bucket (defaults to --default-bucket).
    #[arg(long)]
    bucket: Option<String>,

    /// Storage service endpoint.
    #[arg(long, env = "STORAGE_URL")]
    storage_url: Option<String>,

    /// Storage service key.
    #[arg(long, env = "STORAGE_KEY", hide_env_values = true)]
    storage_key: Option<String>,

    /// Render and "upload" into memory only; nothing leaves the machine.
    #[arg(long)]
    dry_run: bool,

    /// Print the ConversionResult as JSON on stdout.
    #[arg(long, env = "PDF2WEBP_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2WEBP_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// Flags shared by both subcommands.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Rasterisation DPI (72–600).
    #[arg(long, env = "PDF2WEBP_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pages rendered and uploaded at once.
    #[arg(short, long, env = "PDF2WEBP_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Rasterizer executable.
    #[arg(long, env = "PDF2WEBP_RASTERIZER", default_value = "pdftoppm")]
    rasterizer: String,

    /// Bucket used when a request names none.
    #[arg(long, env = "STORAGE_BUCKET", default_value = "editions")]
    default_bucket: String,

    /// Source download timeout in seconds.
    #[arg(long, env = "PDF2WEBP_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-upload timeout in seconds.
    #[arg(long, env = "PDF2WEBP_UPLOAD_TIMEOUT", default_value_t = 60)]
    upload_timeout: u64,

    /// Rasterizer timeout in seconds.
    #[arg(long, env = "PDF2WEBP_RASTERIZE_TIMEOUT", default_value_t = 300)]
    rasterize_timeout: u64,

    /// Parent directory for per-request work directories.
    #[arg(long, env = "PDF2WEBP_WORK_DIR")]
    work_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for interactive conversions.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Convert(args) => convert(args, show_progress, cli.quiet).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args.pipeline, None)?;

    let rasterizer = PdftoppmRasterizer::from_config(&config);
    if !rasterizer.is_available().await {
        tracing::warn!(
            "Rasterizer '{}' not found on PATH; every conversion will fail",
            config.rasterizer_command
        );
    }

    if args.api_secret.is_none() {
        tracing::warn!("No API secret configured; /convert is open to anyone who can reach it");
    }

    let state = AppState::new(Pipeline::new(config), args.api_secret);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((args.bind, args.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.bind, args.port))?;
    tracing::info!("pdf2webp v{} listening on {}:{}", env!("CARGO_PKG_VERSION"), args.bind, args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn convert(args: ConvertArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&args.pipeline, progress_cb)?;

    // Unlike the server, the terminal user may point at local files.
    let fetcher = HttpFetcher::new(config.download_timeout_secs).with_local_paths();
    let mut pipeline = Pipeline::new(config).with_fetcher(Arc::new(fetcher));
    let mut request = ConversionRequest {
        edition_id: args.edition_id.clone(),
        pdf_url: args.input.clone(),
        storage_url: args.storage_url.clone().unwrap_or_default(),
        storage_key: args.storage_key.clone().unwrap_or_default(),
        bucket: args.bucket.clone(),
        ..Default::default()
    };

    // Dry runs need no credentials; anything plausible passes validation.
    let dry_run_store = if args.dry_run {
        let store = MemoryStorage::with_base_url("memory://dry-run");
        pipeline = pipeline.with_storage(Arc::new(store.clone()));
        if request.storage_url.is_empty() {
            request.storage_url = "memory://dry-run".to_string();
        }
        if request.storage_key.is_empty() {
            request.storage_key = "dry-run".to_string();
        }
        Some(store)
    } else {
        None
    };

    let result = pipeline
        .convert(&request)
        .await
        .context("Conversion failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        println!("{json}");
    } else if !quiet {
        eprintln!(
            "{}  {} pages  {} assets  {}ms  →  {}",
            green("✔"),
            result.total_pages,
            result.uploads.len(),
            result.stats.total_duration_ms,
            bold(&result.manifest_url),
        );
        if let Some(store) = dry_run_store {
            let bytes: usize = store
                .paths(&result.bucket)
                .iter()
                .filter_map(|p| store.object(&result.bucket, p))
                .map(|o| o.bytes.len())
                .sum();
            eprintln!("   {}", dim(&format!("dry run: {bytes} bytes kept in memory, nothing uploaded")));
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(args.dpi)
        .concurrency(args.concurrency)
        .rasterizer_command(&args.rasterizer)
        .default_bucket(&args.default_bucket)
        .download_timeout_secs(args.download_timeout)
        .upload_timeout_secs(args.upload_timeout)
        .rasterize_timeout_secs(args.rasterize_timeout);

    if let Some(ref dir) = args.work_dir {
        builder = builder.work_root(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
