//! Format classification: decide which pipeline stages an upload needs.
//!
//! Pure function of `(filename, declared MIME type, first bytes)`. No I/O,
//! no process is ever launched from here, so rejecting an upload costs
//! nothing.
//!
//! ## Resolution order
//!
//! 1. **Content sniff**: bytes starting with `%PDF` are a PDF whatever the
//!    name says (scanners love `scan0001` with no extension).
//! 2. **Extension**: case-insensitive lookup in the office/PDF tables.
//! 3. **MIME type**: only when the filename carries no extension.
//!
//! A name or MIME type that claims PDF while the bytes are not `%PDF` is
//! rejected as malformed: pdftoppm would fail on it anyway, and failing here
//! gives the caller a validation error instead of a conversion error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The four PDF magic bytes.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Broad family of an office document. Informational only: LibreOffice picks
/// its import filter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeKind {
    WordProcessing,
    Spreadsheet,
    Presentation,
}

/// Routing decision for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// Needs office → PDF before rasterization.
    OfficeDocument(OfficeKind),
    /// Rasterize directly.
    Pdf,
    /// Reject without running anything.
    Unsupported,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::OfficeDocument(OfficeKind::WordProcessing) => {
                f.write_str("office document (word processing)")
            }
            DocumentFormat::OfficeDocument(OfficeKind::Spreadsheet) => {
                f.write_str("office document (spreadsheet)")
            }
            DocumentFormat::OfficeDocument(OfficeKind::Presentation) => {
                f.write_str("office document (presentation)")
            }
            DocumentFormat::Pdf => f.write_str("PDF"),
            DocumentFormat::Unsupported => f.write_str("unsupported"),
        }
    }
}

const WORD_PROCESSING: &[&str] = &["doc", "docx", "docm", "dot", "dotx", "odt", "ott", "rtf"];
const SPREADSHEET: &[&str] = &["xls", "xlsx", "xlsm", "ods", "ots"];
const PRESENTATION: &[&str] = &[
    "ppt", "pptx", "pptm", "pps", "ppsx", "pot", "potx", "odp", "otp",
];

const MIME_TABLE: &[(&str, DocumentFormat)] = &[
    ("application/pdf", DocumentFormat::Pdf),
    ("application/msword", DocumentFormat::OfficeDocument(OfficeKind::WordProcessing)),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        DocumentFormat::OfficeDocument(OfficeKind::WordProcessing),
    ),
    ("application/vnd.oasis.opendocument.text", DocumentFormat::OfficeDocument(OfficeKind::WordProcessing)),
    ("application/rtf", DocumentFormat::OfficeDocument(OfficeKind::WordProcessing)),
    ("application/vnd.ms-excel", DocumentFormat::OfficeDocument(OfficeKind::Spreadsheet)),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        DocumentFormat::OfficeDocument(OfficeKind::Spreadsheet),
    ),
    ("application/vnd.oasis.opendocument.spreadsheet", DocumentFormat::OfficeDocument(OfficeKind::Spreadsheet)),
    ("application/vnd.ms-powerpoint", DocumentFormat::OfficeDocument(OfficeKind::Presentation)),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        DocumentFormat::OfficeDocument(OfficeKind::Presentation),
    ),
    ("application/vnd.oasis.opendocument.presentation", DocumentFormat::OfficeDocument(OfficeKind::Presentation)),
];

/// Classify by extension alone (no leading dot, any case).
pub fn format_for_extension(ext: &str) -> DocumentFormat {
    let ext = ext.to_ascii_lowercase();
    let ext = ext.as_str();
    if ext == "pdf" {
        DocumentFormat::Pdf
    } else if WORD_PROCESSING.contains(&ext) {
        DocumentFormat::OfficeDocument(OfficeKind::WordProcessing)
    } else if SPREADSHEET.contains(&ext) {
        DocumentFormat::OfficeDocument(OfficeKind::Spreadsheet)
    } else if PRESENTATION.contains(&ext) {
        DocumentFormat::OfficeDocument(OfficeKind::Presentation)
    } else {
        DocumentFormat::Unsupported
    }
}

/// Classify by MIME type, ignoring parameters such as `; charset=`.
pub fn format_for_mime(mime: &str) -> DocumentFormat {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    MIME_TABLE
        .iter()
        .find(|(m, _)| *m == essence)
        .map(|(_, f)| *f)
        .unwrap_or(DocumentFormat::Unsupported)
}

/// Lower-cased extension of the final path component, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    // Windows-style separators count too: browsers on Windows used to send
    // full client paths.
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Classify an upload.
///
/// `head` is the beginning of the upload (any length; only the first four
/// bytes are inspected). Pass an empty slice to skip the sniff.
pub fn classify(filename: &str, content_type: Option<&str>, head: &[u8]) -> DocumentFormat {
    let looks_like_pdf = head.starts_with(PDF_MAGIC);
    if looks_like_pdf {
        return DocumentFormat::Pdf;
    }

    let by_name = extension_of(filename).map(|e| format_for_extension(&e));
    let declared = match by_name {
        Some(format) => format,
        None => content_type
            .map(format_for_mime)
            .unwrap_or(DocumentFormat::Unsupported),
    };

    match declared {
        // Claims PDF but the sniff disagrees. An empty `head` means the
        // caller skipped the sniff, so trust the name.
        DocumentFormat::Pdf if !head.is_empty() => DocumentFormat::Unsupported,
        other => other,
    }
}

/// Human-readable reason an upload was classified as unsupported.
pub fn unsupported_reason(filename: &str, content_type: Option<&str>) -> String {
    match extension_of(filename) {
        Some(ext) if ext == "pdf" => "file has a .pdf extension but is not a PDF".to_string(),
        Some(ext) => format!("'.{ext}' is not a supported office or PDF format"),
        None => match content_type {
            Some(ct) if format_for_mime(ct) == DocumentFormat::Pdf => {
                "declared application/pdf but the content is not a PDF".to_string()
            }
            Some(ct) => format!("content type '{ct}' is not supported"),
            None => "file has no extension and no recognised content type".to_string(),
        },
    }
}
