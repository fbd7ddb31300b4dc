//! Error types for the edgequake-doc2img library.
//!
//! Every failure a job can hit is a [`Doc2ImgError`]. Callers that only need
//! to react (pick an HTTP status, decide whether resubmitting makes sense)
//! look at [`Doc2ImgError::kind`], which folds the variants onto four stable
//! [`ErrorKind`]s:
//!
//! | Kind | Meaning | Retry? |
//! |------|---------|--------|
//! | `ValidationError`   | unsupported or malformed upload | no, fix the input |
//! | `ConversionTimeout` | an external stage exceeded its budget | caller may resubmit |
//! | `ConversionFailed`  | an external stage exited abnormally or produced nothing usable | no |
//! | `InternalError`     | workspace / filesystem / deployment problem | maybe, after ops fix it |
//!
//! [`Doc2ImgError::public_message`] is what goes back to an API client: it
//! keeps stage diagnostics for conversion failures but never exposes
//! server paths for internal ones.

use crate::job::StageKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Stable, client-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    ConversionTimeout,
    ConversionFailed,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::ConversionTimeout => "ConversionTimeout",
            ErrorKind::ConversionFailed => "ConversionFailed",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(s)
    }
}

/// All errors returned by the edgequake-doc2img library.
#[derive(Debug, Error)]
pub enum Doc2ImgError {
    // ── Validation errors ────────────────────────────────────────────────
    /// The upload's name, MIME type and content match no supported format.
    #[error("Unsupported file type for '{filename}': {reason}")]
    UnsupportedFormat { filename: String, reason: String },

    /// The upload contained no bytes.
    #[error("Uploaded file '{filename}' is empty")]
    EmptyUpload { filename: String },

    /// The upload exceeds the configured size cap.
    #[error("Uploaded file '{filename}' is {size} bytes; the limit is {limit} bytes")]
    UploadTooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },

    /// The request carried no file at all.
    #[error("No file was uploaded (expected a multipart field named 'file')")]
    MissingUpload,

    // ── Stage errors ─────────────────────────────────────────────────────
    /// An external tool ran past its budget and was killed.
    #[error("{stage} timed out after {}s ({tool} was terminated)", .timeout.as_secs_f64())]
    ConversionTimeout {
        stage: StageKind,
        tool: String,
        timeout: Duration,
    },

    /// An external tool exited abnormally or produced unusable output.
    #[error("{stage} failed ({tool}{}): {detail}{}", exit_suffix(.exit_code), stderr_suffix(.stderr))]
    ConversionFailed {
        stage: StageKind,
        tool: String,
        exit_code: Option<i32>,
        detail: String,
        stderr: String,
    },

    // ── Internal errors ──────────────────────────────────────────────────
    /// A required external tool is not installed or not executable.
    #[error("{stage} is unavailable: {reason}")]
    ToolUnavailable { stage: StageKind, reason: String },

    /// Creating, writing or removing a job workspace failed.
    #[error("Workspace error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Uploading page images to object storage failed.
    #[error("Publishing page images failed: {0}")]
    PublishFailed(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(", exit code {c}")).unwrap_or_default()
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {stderr}")
    }
}

impl Doc2ImgError {
    /// Fold this error onto its client-facing kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Doc2ImgError::UnsupportedFormat { .. }
            | Doc2ImgError::EmptyUpload { .. }
            | Doc2ImgError::UploadTooLarge { .. }
            | Doc2ImgError::MissingUpload => ErrorKind::ValidationError,
            Doc2ImgError::ConversionTimeout { .. } => ErrorKind::ConversionTimeout,
            Doc2ImgError::ConversionFailed { .. } => ErrorKind::ConversionFailed,
            Doc2ImgError::ToolUnavailable { .. }
            | Doc2ImgError::Workspace { .. }
            | Doc2ImgError::PublishFailed(_)
            | Doc2ImgError::InvalidConfig(_)
            | Doc2ImgError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Message safe to return to an API client.
    ///
    /// Internal errors collapse to a generic sentence; the full error is
    /// only ever logged.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::InternalError => match self {
                Doc2ImgError::PublishFailed(_) => {
                    "Page images were rendered but could not be published".to_string()
                }
                _ => "Internal error while processing the document".to_string(),
            },
            _ => self.to_string(),
        }
    }

    /// The stage that produced this error, if any.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Doc2ImgError::ConversionTimeout { stage, .. }
            | Doc2ImgError::ConversionFailed { stage, .. }
            | Doc2ImgError::ToolUnavailable { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Doc2ImgError::Workspace {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> Doc2ImgError {
        Doc2ImgError::ConversionFailed {
            stage: StageKind::PdfToImages,
            tool: "pdftoppm".into(),
            exit_code: Some(1),
            detail: "no page images were produced".into(),
            stderr: "Syntax Error: Couldn't read xref table".into(),
        }
    }

    #[test]
    fn conversion_failed_display_carries_diagnostics() {
        let msg = failed().to_string();
        assert!(msg.contains("rasterization"), "got: {msg}");
        assert!(msg.contains("exit code 1"), "got: {msg}");
        assert!(msg.contains("xref"), "got: {msg}");
    }

    #[test]
    fn conversion_failed_display_without_exit_code() {
        let e = Doc2ImgError::ConversionFailed {
            stage: StageKind::OfficeToPdf,
            tool: "soffice".into(),
            exit_code: None,
            detail: "killed by signal".into(),
            stderr: String::new(),
        };
        let msg = e.to_string();
        assert!(!msg.contains("exit code"), "got: {msg}");
        assert!(!msg.contains("stderr"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = Doc2ImgError::ConversionTimeout {
            stage: StageKind::OfficeToPdf,
            tool: "soffice".into(),
            timeout: Duration::from_secs(5),
        };
        let msg = e.to_string();
        assert!(msg.contains("5s"), "got: {msg}");
        assert!(msg.contains("office"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::ConversionTimeout);
    }

    #[test]
    fn kinds_cover_taxonomy() {
        assert_eq!(
            Doc2ImgError::EmptyUpload {
                filename: "a.pdf".into()
            }
            .kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(failed().kind(), ErrorKind::ConversionFailed);
        assert_eq!(
            Doc2ImgError::Internal("boom".into()).kind(),
            ErrorKind::InternalError
        );
    }

    #[test]
    fn internal_public_message_hides_paths() {
        let e = Doc2ImgError::workspace(
            "/srv/uploads/job-123",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(e.kind(), ErrorKind::InternalError);
        assert!(!e.public_message().contains("/srv"));
    }

    #[test]
    fn stage_is_reported_for_stage_errors() {
        assert_eq!(failed().stage(), Some(StageKind::PdfToImages));
        assert_eq!(Doc2ImgError::MissingUpload.stage(), None);
    }

    #[test]
    fn kind_serialises_as_name() {
        let s = serde_json::to_string(&ErrorKind::ConversionTimeout).unwrap();
        assert_eq!(s, "\"ConversionTimeout\"");
    }
}
