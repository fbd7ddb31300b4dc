//! Output types: what a finished job hands back.

use crate::config::ImageFormat;
use crate::error::Doc2ImgError;
use crate::pipeline::classify::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A validated page image on disk, inside a job workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImage {
    /// 1-based page index.
    pub page: usize,
    pub path: PathBuf,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// A page image read into memory.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page index.
    pub page: usize,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("page", &self.page)
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// Timing for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub page_count: usize,
    /// Office → PDF wall time; absent for PDF input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub office_duration_ms: Option<u64>,
    pub raster_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Terminal success value of a job.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub job_id: Uuid,
    pub filename: String,
    pub format: DocumentFormat,
    /// Page images in document order.
    pub pages: Vec<PageImage>,
    pub stats: ConversionStats,
}

/// Outcome of one job.
pub type ConversionResult = Result<ConversionOutput, Doc2ImgError>;
