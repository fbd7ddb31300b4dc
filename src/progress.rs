//! Progress-callback trait for per-job conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ServiceConfigBuilder::progress_callback`] to receive
//! events as a job moves through its stages.
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least-invasive integration point: the CLI drives a
//! terminal spinner from it, a host application can forward events to a
//! broadcast channel or a metrics counter, and the library knows nothing about
//! either. The trait is `Send + Sync` because concurrent HTTP requests share
//! one configured callback.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2img::{ConversionProgressCallback, ServiceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for PageCounter {
//!     fn on_job_complete(&self, _job_id: &str, page_count: usize) {
//!         self.pages.fetch_add(page_count, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { pages: AtomicUsize::new(0) });
//!
//! let config = ServiceConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ErrorKind;
use crate::job::StageKind;
use std::sync::Arc;

/// Called by the orchestrator as a job progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events of different jobs interleave freely; events of
/// one job arrive in order.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the upload has been accepted, before classification.
    fn on_job_start(&self, job_id: &str, filename: &str) {
        let _ = (job_id, filename);
    }

    /// Called just before an external tool is launched.
    fn on_stage_start(&self, job_id: &str, stage: StageKind) {
        let _ = (job_id, stage);
    }

    /// Called when a stage finished successfully.
    ///
    /// # Arguments
    /// * `elapsed_ms`: wall-clock time of the tool run, permit wait excluded
    fn on_stage_complete(&self, job_id: &str, stage: StageKind, elapsed_ms: u64) {
        let _ = (job_id, stage, elapsed_ms);
    }

    /// Called once when the job reached `succeeded`.
    fn on_job_complete(&self, job_id: &str, page_count: usize) {
        let _ = (job_id, page_count);
    }

    /// Called once when the job reached `failed`.
    fn on_job_failed(&self, job_id: &str, kind: ErrorKind, message: &str) {
        let _ = (job_id, kind, message);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
