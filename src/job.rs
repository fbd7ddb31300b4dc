//! Per-request job state: status machine, pipeline plan, stage descriptors.
//!
//! A [`ConversionJob`] lives exactly as long as one upload is being handled.
//! Only the orchestrator in [`crate::convert`] mutates it, and every status
//! change goes through [`ConversionJob::transition`], which rejects moves the
//! state machine does not allow:
//!
//! ```text
//! pending ──▶ converting ──▶ rasterizing ──▶ succeeded
//!    │             │              │
//!    └─────────────┴──────────────┴────────▶ failed
//! pending ─────────────────────▶ rasterizing            (PDF input)
//! ```

use crate::error::{Doc2ImgError, ErrorKind};
use crate::output::OutputImage;
use crate::pipeline::classify::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Converting,
    Rasterizing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Converting) | (Pending, Rasterizing) => true,
            (Converting, Rasterizing) => true,
            (Rasterizing, Succeeded) => true,
            (Pending | Converting | Rasterizing, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Converting => "converting",
            JobStatus::Rasterizing => "rasterizing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which external stage a [`PipelineStage`] (or an error) refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    OfficeToPdf,
    PdfToImages,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::OfficeToPdf => f.write_str("office-to-PDF conversion"),
            StageKind::PdfToImages => f.write_str("PDF rasterization"),
        }
    }
}

/// One planned external-process step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStage {
    /// LibreOffice: `input` → `output` (a single PDF).
    OfficeToPdf {
        input: PathBuf,
        output: PathBuf,
        timeout: Duration,
    },
    /// pdftoppm: `input` → `<output_prefix>-<N>.<ext>` per page.
    PdfToImages {
        input: PathBuf,
        output_prefix: PathBuf,
        timeout: Duration,
    },
}

impl PipelineStage {
    pub fn kind(&self) -> StageKind {
        match self {
            PipelineStage::OfficeToPdf { .. } => StageKind::OfficeToPdf,
            PipelineStage::PdfToImages { .. } => StageKind::PdfToImages,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            PipelineStage::OfficeToPdf { timeout, .. } | PipelineStage::PdfToImages { timeout, .. } => {
                *timeout
            }
        }
    }
}

/// Prefix for rendered page files inside a workspace.
pub const PAGE_PREFIX: &str = "page";

/// Build the ordered stage list for a classified upload.
///
/// Office documents always pass through `OfficeToPdf` first; PDFs go
/// straight to rasterization. Returns an empty plan for unsupported input.
pub fn plan_stages(
    format: &DocumentFormat,
    source: &Path,
    workspace: &Path,
    office_timeout: Duration,
    raster_timeout: Duration,
) -> Vec<PipelineStage> {
    let output_prefix = workspace.join(PAGE_PREFIX);
    match format {
        DocumentFormat::OfficeDocument(_) => {
            let stem = source
                .file_stem()
                .map(|s| s.to_os_string())
                .unwrap_or_else(|| "source".into());
            let pdf = workspace.join(stem).with_extension("pdf");
            vec![
                PipelineStage::OfficeToPdf {
                    input: source.to_path_buf(),
                    output: pdf.clone(),
                    timeout: office_timeout,
                },
                PipelineStage::PdfToImages {
                    input: pdf,
                    output_prefix,
                    timeout: raster_timeout,
                },
            ]
        }
        DocumentFormat::Pdf => vec![PipelineStage::PdfToImages {
            input: source.to_path_buf(),
            output_prefix,
            timeout: raster_timeout,
        }],
        DocumentFormat::Unsupported => Vec::new(),
    }
}

/// The lifecycle record of one upload.
#[derive(Debug)]
pub struct ConversionJob {
    pub id: Uuid,
    pub filename: String,
    pub content_type: Option<String>,
    pub format: DocumentFormat,
    pub workspace: Option<PathBuf>,
    pub plan: Vec<PipelineStage>,
    status: JobStatus,
    error: Option<(ErrorKind, String)>,
    outputs: Vec<OutputImage>,
}

impl ConversionJob {
    pub fn new(filename: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            content_type,
            format: DocumentFormat::Unsupported,
            workspace: None,
            plan: Vec::new(),
            status: JobStatus::Pending,
            error: None,
            outputs: Vec::new(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Error kind and detail; `Some` only when the job has failed.
    pub fn error(&self) -> Option<&(ErrorKind, String)> {
        self.error.as_ref()
    }

    /// Ordered page images; non-empty only when the job has succeeded.
    pub fn outputs(&self) -> &[OutputImage] {
        &self.outputs
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), Doc2ImgError> {
        if !self.status.can_transition_to(next) {
            return Err(Doc2ImgError::Internal(format!(
                "job {}: illegal status transition {} → {}",
                self.id, self.status, next
            )));
        }
        debug!("job {}: {} → {}", self.id, self.status, next);
        self.status = next;
        Ok(())
    }

    /// Terminal success with the validated page images.
    pub fn succeed(&mut self, outputs: Vec<OutputImage>) -> Result<(), Doc2ImgError> {
        if outputs.is_empty() {
            return Err(Doc2ImgError::Internal(format!(
                "job {}: cannot succeed without output images",
                self.id
            )));
        }
        self.transition(JobStatus::Succeeded)?;
        self.outputs = outputs;
        Ok(())
    }

    /// Terminal failure. Already-terminal jobs keep their first outcome.
    pub fn fail(&mut self, err: &Doc2ImgError) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error = Some((err.kind(), err.to_string()));
        self.outputs.clear();
    }
}
