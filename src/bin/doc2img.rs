//! CLI binary for edgequake-doc2img.
//!
//! A thin shim over the library crate: `serve` runs the HTTP API, `convert`
//! runs the same pipeline once on a local file and writes the page images to
//! a directory.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_doc2img::server::{self, AppState};
use edgequake_doc2img::{
    ConversionOutput, ConversionProgressCallback, Converter, ErrorKind, ImageFormat,
    ProgressCallback, Publisher, ServiceConfig, StageKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal spinner driven by job events. One job per `convert` run, so the
/// stage lines always arrive in order.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_job_start(&self, _job_id: &str, filename: &str) {
        self.bar.set_message(filename.to_string());
    }

    fn on_stage_start(&self, _job_id: &str, stage: StageKind) {
        let prefix = match stage {
            StageKind::OfficeToPdf => "Converting",
            StageKind::PdfToImages => "Rendering",
        };
        self.bar.set_prefix(prefix);
    }

    fn on_stage_complete(&self, _job_id: &str, stage: StageKind, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<26} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_job_complete(&self, _job_id: &str, page_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages rendered",
            green("✔"),
            bold(&page_count.to_string())
        );
    }

    fn on_job_failed(&self, _job_id: &str, kind: ErrorKind, message: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}: {}", red("✘"), kind, message);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP API on port 8000
  doc2img serve --port 8000

  # Upload a deck
  curl -F file=@slides.pptx http://localhost:8000/upload

  # One-shot conversion to a directory
  doc2img convert report.docx -o pages/

  # JPEG at 200 DPI, JSON summary on stdout
  doc2img convert --format jpeg --dpi 200 --json doc.pdf -o out/

ENVIRONMENT VARIABLES:
  DOC2IMG_SOFFICE_PATH    Path to LibreOffice soffice (else searched)
  DOC2IMG_PDFTOPPM_PATH   Path to poppler pdftoppm (else searched)
  SUPABASE_URL            Publish page images to Supabase Storage (serve only)
  SUPABASE_KEY            Service key for SUPABASE_URL
  SUPABASE_BUCKET         Bucket name (default: presentations)
  RUST_LOG                Overrides -v / -q log filtering
"#;

/// Convert office documents and PDFs into per-page images.
#[derive(Parser, Debug)]
#[command(
    name = "doc2img",
    version,
    about = "Convert office documents and PDFs into per-page images",
    long_about = "Convert office documents (Word, Excel, PowerPoint, OpenDocument) and PDFs into \
one image per page, using headless LibreOffice and poppler's pdftoppm. Runs as an HTTP \
service or as a one-shot command.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOC2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOC2IMG_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Host address to bind to.
        #[arg(long, env = "DOC2IMG_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on.
        #[arg(short, long, env = "DOC2IMG_PORT", default_value_t = 8000)]
        port: u16,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Convert one local file and write its pages to a directory.
    Convert {
        /// Office document or PDF to convert.
        input: PathBuf,

        /// Directory for page-NNN.<ext> files (created if missing).
        #[arg(short, long, env = "DOC2IMG_OUTPUT")]
        output: PathBuf,

        /// Print a JSON summary on stdout.
        #[arg(long, env = "DOC2IMG_JSON")]
        json: bool,

        /// Disable the progress spinner.
        #[arg(long, env = "DOC2IMG_NO_PROGRESS")]
        no_progress: bool,

        #[command(flatten)]
        service: ServiceArgs,
    },
}

/// Flags shared by both subcommands, mapped onto `ServiceConfig`.
#[derive(Args, Debug)]
struct ServiceArgs {
    /// Base directory for per-job workspaces.
    #[arg(long, env = "DOC2IMG_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Office → PDF timeout in seconds.
    #[arg(long, env = "DOC2IMG_OFFICE_TIMEOUT", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    office_timeout: u64,

    /// PDF → images timeout in seconds.
    #[arg(long, env = "DOC2IMG_RASTER_TIMEOUT", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..))]
    raster_timeout: u64,

    /// Maximum jobs running external tools at once.
    #[arg(long, env = "DOC2IMG_MAX_CONCURRENT", default_value_t = 4)]
    max_concurrent: usize,

    /// Rendering DPI (72–400).
    #[arg(long, env = "DOC2IMG_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Cap on the longest edge of a page image, in pixels.
    #[arg(long, env = "DOC2IMG_MAX_PIXELS")]
    max_pixels: Option<u32>,

    /// Page image format.
    #[arg(long, env = "DOC2IMG_FORMAT", value_enum, default_value = "png")]
    format: FormatArg,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "DOC2IMG_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Explicit path to LibreOffice `soffice`.
    #[arg(long, env = "DOC2IMG_SOFFICE_PATH")]
    soffice: Option<PathBuf>,

    /// Explicit path to poppler `pdftoppm`.
    #[arg(long, env = "DOC2IMG_PDFTOPPM_PATH")]
    pdftoppm: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for ImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Jpeg => ImageFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback in `convert`; keep library INFO logs
    // out of its way unless asked for.
    let show_progress = match &cli.command {
        Command::Convert {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        Command::Serve { .. } => false,
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
        Command::Serve {
            host,
            port,
            service,
        } => run_serve(&host, port, &service).await,
        Command::Convert {
            input,
            output,
            json,
            no_progress: _,
            service,
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
            } else {
                None
            };
            run_convert(&input, &output, json, cli.quiet, &service, progress).await
        }
    }
}

async fn run_serve(host: &str, port: u16, args: &ServiceArgs) -> Result<()> {
    let config = build_config(args, None)?;
    let converter = Converter::new(config).context("Failed to initialise converter")?;
    let publisher = Publisher::from_env().context("Invalid Supabase configuration")?;
    if let Some(ref p) = publisher {
        info!("Publishing page images to bucket '{}'", p.bucket());
    }

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let state = AppState {
        converter: Arc::new(converter),
        publisher,
    };

    server::serve(addr, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received, draining in-flight requests");
    }
}

/// JSON summary printed by `convert --json`.
#[derive(Serialize)]
struct ConvertSummary<'a> {
    #[serde(flatten)]
    output: OutputMeta<'a>,
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct OutputMeta<'a> {
    job_id: String,
    filename: &'a str,
    format: edgequake_doc2img::DocumentFormat,
    page_count: usize,
    stats: &'a edgequake_doc2img::ConversionStats,
}

async fn run_convert(
    input: &Path,
    out_dir: &Path,
    json: bool,
    quiet: bool,
    args: &ServiceArgs,
    progress: Option<ProgressCallback>,
) -> Result<()> {
    let config = build_config(args, progress)?;
    let converter = Converter::new(config).context("Failed to initialise converter")?;

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());

    let output = converter
        .run(&bytes, &filename, None)
        .await
        .context("Conversion failed")?;

    let files = write_pages(&output, out_dir).await?;

    if json {
        let summary = ConvertSummary {
            output: OutputMeta {
                job_id: output.job_id.to_string(),
                filename: &output.filename,
                format: output.format,
                page_count: output.pages.len(),
                stats: &output.stats,
            },
            files,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !quiet {
        eprintln!(
            "   {} pages  {}ms  →  {}",
            output.pages.len(),
            output.stats.total_duration_ms,
            bold(&out_dir.display().to_string()),
        );
    }
    Ok(())
}

/// Write `page-NNN.<ext>` files into `out_dir`.
async fn write_pages(output: &ConversionOutput, out_dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let width = output.pages.len().to_string().len().max(3);
    let mut files = Vec::with_capacity(output.pages.len());
    for page in &output.pages {
        let ext = if page.mime_type == "image/jpeg" { "jpg" } else { "png" };
        let path = out_dir.join(format!("page-{:0width$}.{ext}", page.page));
        tokio::fs::write(&path, &page.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        files.push(path);
    }
    Ok(files)
}

/// Map CLI args to `ServiceConfig`.
fn build_config(args: &ServiceArgs, progress: Option<ProgressCallback>) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .upload_dir(&args.upload_dir)
        .office_timeout(Duration::from_secs(args.office_timeout))
        .raster_timeout(Duration::from_secs(args.raster_timeout))
        .max_concurrent_conversions(args.max_concurrent)
        .dpi(args.dpi)
        .image_format(args.format.clone().into())
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024));

    if let Some(px) = args.max_pixels {
        builder = builder.max_rendered_pixels(px);
    }
    if let Some(ref path) = args.soffice {
        builder = builder.soffice_path(path);
    }
    if let Some(ref path) = args.pdftoppm {
        builder = builder.pdftoppm_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
