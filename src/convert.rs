//! Conversion orchestrator: one upload in, ordered page images (or a
//! structured failure) out.
//!
//! ## Flow of one job
//!
//! ```text
//! validate size ─▶ classify ─▶ acquire workspace ─▶ write source.<ext>
//!     ─▶ wait for permit ─▶ [office → PDF] ─▶ PDF → images
//!     ─▶ load pages ─▶ succeed ─▶ release workspace (blocking pool)
//! ```
//!
//! Rejections that need no disk (empty, oversized, unsupported) happen
//! before a workspace exists. From acquisition on, the [`Workspace`] guard
//! removes the directory on every exit path, including a dropped future.
//!
//! ## Why a semaphore around the tools?
//!
//! LibreOffice is heavy (hundreds of MB per instance). The permit bounds
//! how many jobs run external tools at once; the wait for it is outside the
//! stage timeouts, which only measure the tool itself.

use crate::config::ServiceConfig;
use crate::error::Doc2ImgError;
use crate::job::{plan_stages, ConversionJob, JobStatus, PipelineStage, StageKind};
use crate::output::{ConversionOutput, ConversionResult, ConversionStats, OutputImage, PageImage};
use crate::pipeline::classify::{self, DocumentFormat, OfficeKind};
use crate::pipeline::render::RenderOptions;
use crate::pipeline::{assemble, office, render};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::workspace::Workspace;
use engine_locate::Engine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, info_span, warn, Instrument};

/// Runs conversion jobs against one [`ServiceConfig`].
///
/// Cheap to share: wrap in an `Arc` (the HTTP server does) and call
/// [`Converter::run`] from as many tasks as you like.
pub struct Converter {
    config: Arc<ServiceConfig>,
    soffice: Result<PathBuf, String>,
    pdftoppm: Result<PathBuf, String>,
    permits: Arc<Semaphore>,
    progress: ProgressCallback,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("soffice", &self.soffice)
            .field("pdftoppm", &self.pdftoppm)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl Converter {
    /// Create the upload directory and locate the external tools.
    ///
    /// A missing tool is logged, not fatal: a PDF-only deployment never
    /// needs LibreOffice. Jobs that reach a stage whose tool is missing fail
    /// with an internal error.
    pub fn new(config: ServiceConfig) -> Result<Self, Doc2ImgError> {
        std::fs::create_dir_all(&config.upload_dir)
            .map_err(|e| Doc2ImgError::workspace(&config.upload_dir, e))?;

        let soffice = locate_tool(Engine::Soffice, config.soffice_path.as_deref());
        let pdftoppm = locate_tool(Engine::Pdftoppm, config.pdftoppm_path.as_deref());
        let permits = Arc::new(Semaphore::new(config.max_concurrent_conversions));
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));

        info!(
            "Converter ready: uploads in {}, {} concurrent conversions",
            config.upload_dir.display(),
            config.max_concurrent_conversions
        );

        Ok(Self {
            config: Arc::new(config),
            soffice,
            pdftoppm,
            permits,
            progress,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Resolved path of a tool, if it was found.
    pub fn tool_path(&self, engine: Engine) -> Option<&Path> {
        let found = match engine {
            Engine::Soffice => &self.soffice,
            Engine::Pdftoppm => &self.pdftoppm,
        };
        found.as_ref().ok().map(PathBuf::as_path)
    }

    /// Convert one upload.
    ///
    /// Returns when the job reached a terminal state; by then its workspace
    /// has been removed.
    pub async fn run(
        &self,
        bytes: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> ConversionResult {
        let mut job = ConversionJob::new(filename, content_type.map(str::to_string));
        let span = info_span!("job", id = %job.id);

        async {
            let job_id = job.id.to_string();
            info!("Received '{}' ({} bytes)", filename, bytes.len());
            self.progress.on_job_start(&job_id, filename);

            match self.execute(&mut job, bytes).await {
                Ok(output) => {
                    info!(
                        "Job succeeded: {} pages in {}ms",
                        output.stats.page_count, output.stats.total_duration_ms
                    );
                    self.progress.on_job_complete(&job_id, output.pages.len());
                    Ok(output)
                }
                Err(err) => {
                    job.fail(&err);
                    warn!("Job failed ({}): {}", err.kind(), err);
                    self.progress
                        .on_job_failed(&job_id, err.kind(), &err.public_message());
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job: &mut ConversionJob,
        bytes: &[u8],
    ) -> Result<ConversionOutput, Doc2ImgError> {
        let total_start = Instant::now();
        let job_id = job.id.to_string();

        // ── Step 1: Validate ─────────────────────────────────────────────
        if bytes.is_empty() {
            return Err(Doc2ImgError::EmptyUpload {
                filename: job.filename.clone(),
            });
        }
        if bytes.len() > self.config.max_upload_bytes {
            return Err(Doc2ImgError::UploadTooLarge {
                filename: job.filename.clone(),
                size: bytes.len(),
                limit: self.config.max_upload_bytes,
            });
        }

        // ── Step 2: Classify ─────────────────────────────────────────────
        let format = classify::classify(&job.filename, job.content_type.as_deref(), bytes);
        job.format = format;
        if format == DocumentFormat::Unsupported {
            return Err(Doc2ImgError::UnsupportedFormat {
                filename: job.filename.clone(),
                reason: classify::unsupported_reason(&job.filename, job.content_type.as_deref()),
            });
        }
        info!("Classified as {}", format);

        // ── Step 3: Workspace ────────────────────────────────────────────
        let workspace = Workspace::acquire(&self.config.upload_dir, job.id)?;
        job.workspace = Some(workspace.path().to_path_buf());

        let result = self.convert_in(job, &workspace, bytes, format).await;
        if let Err(err) = &result {
            job.fail(err);
        }

        // ── Step 6: Release ──────────────────────────────────────────────
        if let Err(e) = workspace.close().await {
            warn!("{}", e);
        }

        let (pages, timings) = result?;
        Ok(ConversionOutput {
            job_id: job.id,
            filename: job.filename.clone(),
            format,
            stats: ConversionStats {
                page_count: pages.len(),
                office_duration_ms: timings.office_ms,
                raster_duration_ms: timings.raster_ms,
                total_duration_ms: total_start.elapsed().as_millis() as u64,
            },
            pages,
        })
    }

    /// Steps 4 and 5: everything that needs the workspace on disk.
    async fn convert_in(
        &self,
        job: &mut ConversionJob,
        workspace: &Workspace,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<(Vec<PageImage>, StageTimings), Doc2ImgError> {
        let job_id = job.id.to_string();
        let extension = source_extension(&format, &job.filename);
        let source = workspace.write_source(bytes, extension.as_deref()).await?;

        job.plan = plan_stages(
            &format,
            &source,
            workspace.path(),
            self.config.office_timeout,
            self.config.raster_timeout,
        );

        // ── Step 4: Run stages ───────────────────────────────────────────
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Doc2ImgError::Internal(format!("conversion semaphore closed: {e}")))?;

        let mut timings = StageTimings::default();
        let mut images: Vec<OutputImage> = Vec::new();

        for stage in job.plan.clone() {
            let kind = stage.kind();
            let next = match kind {
                StageKind::OfficeToPdf => JobStatus::Converting,
                StageKind::PdfToImages => JobStatus::Rasterizing,
            };
            job.transition(next)?;
            self.progress.on_stage_start(&job_id, kind);
            let stage_start = Instant::now();

            match stage {
                PipelineStage::OfficeToPdf {
                    input,
                    output,
                    timeout,
                } => {
                    let soffice = self.require_tool(Engine::Soffice, kind)?;
                    office::convert_to_pdf(soffice, &input, &output, workspace.path(), timeout)
                        .await?;
                }
                PipelineStage::PdfToImages {
                    input,
                    output_prefix,
                    timeout,
                } => {
                    let pdftoppm = self.require_tool(Engine::Pdftoppm, kind)?;
                    let opts = self.render_options();
                    images =
                        render::rasterize(pdftoppm, &input, &output_prefix, &opts, timeout).await?;
                }
            }

            let elapsed_ms = stage_start.elapsed().as_millis() as u64;
            match kind {
                StageKind::OfficeToPdf => timings.office_ms = Some(elapsed_ms),
                StageKind::PdfToImages => timings.raster_ms = elapsed_ms,
            }
            info!("{} finished in {}ms", kind, elapsed_ms);
            self.progress.on_stage_complete(&job_id, kind, elapsed_ms);
        }
        drop(permit);

        // ── Step 5: Assemble ─────────────────────────────────────────────
        let pages = assemble::load_pages(&images).await?;
        job.succeed(images)?;
        Ok((pages, timings))
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dpi: self.config.dpi,
            max_rendered_pixels: self.config.max_rendered_pixels,
            format: self.config.image_format,
        }
    }

    fn require_tool(&self, engine: Engine, stage: StageKind) -> Result<&Path, Doc2ImgError> {
        let found = match engine {
            Engine::Soffice => &self.soffice,
            Engine::Pdftoppm => &self.pdftoppm,
        };
        found
            .as_ref()
            .map(PathBuf::as_path)
            .map_err(|reason| Doc2ImgError::ToolUnavailable {
                stage,
                reason: reason.clone(),
            })
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StageTimings {
    office_ms: Option<u64>,
    raster_ms: u64,
}

fn locate_tool(engine: Engine, explicit: Option<&Path>) -> Result<PathBuf, String> {
    match engine_locate::resolve(engine, explicit) {
        Ok(path) => {
            info!("Using {} at {}", engine, path.display());
            Ok(path)
        }
        Err(e) => {
            warn!("{}", e);
            Err(e.to_string())
        }
    }
}

/// Extension for the workspace copy of the upload. PDFs are always `.pdf`;
/// office documents keep the client's extension, or get a typical one for
/// their kind when only the MIME type identified them.
fn source_extension(format: &DocumentFormat, filename: &str) -> Option<String> {
    match format {
        DocumentFormat::Pdf => Some("pdf".to_string()),
        DocumentFormat::OfficeDocument(kind) => {
            Some(classify::extension_of(filename).unwrap_or_else(|| {
                match kind {
                    OfficeKind::WordProcessing => "docx",
                    OfficeKind::Spreadsheet => "xlsx",
                    OfficeKind::Presentation => "pptx",
                }
                .to_string()
            }))
        }
        DocumentFormat::Unsupported => None,
    }
}
