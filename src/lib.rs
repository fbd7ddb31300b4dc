//! # edgequake-doc2img
//!
//! Turn uploaded documents (Word, Excel, PowerPoint, OpenDocument, PDF) into
//! one image per page.
//!
//! ## Why this crate?
//!
//! Rendering office documents faithfully means re-implementing a layout
//! engine. LibreOffice already is one, and poppler's `pdftoppm` is the
//! reference PDF rasteriser. This crate does not render anything itself: it
//! drives both as headless subprocesses and owns everything around them
//! (routing by format, per-job isolation, timeouts, cleanup, ordering and
//! validating the output) so a caller gets either every page in order or a
//! precise, typed failure.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Classify   %PDF sniff, extension, MIME type
//!  ├─ 2. Workspace  job-<uuid>-<random>/source.<ext>
//!  ├─ 3. Office     soffice --headless --convert-to pdf   (office input only)
//!  ├─ 4. Render     pdftoppm -png -r <dpi>
//!  ├─ 5. Assemble   read page-N images in page order
//!  └─ 6. Release    workspace removed on every exit path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2img::{Converter, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::new(ServiceConfig::default())?;
//!     let bytes = std::fs::read("slides.pptx")?;
//!     let output = converter.run(&bytes, "slides.pptx", None).await?;
//!     for page in &output.pages {
//!         println!("page {}: {}x{} {}", page.page, page.width, page.height, page.mime_type);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum router for `POST /upload` and `GET /health` |
//! | `cli`    | on      | Enables the `doc2img` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when embedding only the library:
//! ```toml
//! edgequake-doc2img = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Needed for | Found via |
//! |------|------------|-----------|
//! | LibreOffice `soffice` | office documents | config, `DOC2IMG_SOFFICE_PATH`, `PATH`, install dirs |
//! | poppler `pdftoppm`   | every upload     | config, `DOC2IMG_PDFTOPPM_PATH`, `PATH`, install dirs |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod publish;
#[cfg(feature = "server")]
pub mod server;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ImageFormat, ServiceConfig, ServiceConfigBuilder};
pub use convert::Converter;
pub use error::{Doc2ImgError, ErrorKind};
pub use job::{ConversionJob, JobStatus, PipelineStage, StageKind};
pub use output::{ConversionOutput, ConversionResult, ConversionStats, OutputImage, PageImage};
pub use pipeline::classify::{classify, DocumentFormat, OfficeKind};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use publish::Publisher;
pub use workspace::Workspace;

pub use engine_locate::Engine;
