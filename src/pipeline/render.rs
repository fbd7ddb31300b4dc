//! PDF rasterisation: one image per page via poppler's `pdftoppm`.
//!
//! ## Output naming
//!
//! `pdftoppm -png doc.pdf <dir>/page` writes `page-1.png … page-9.png` for a
//! short document and `page-01.png … page-12.png` for a longer one (the page
//! number is zero-padded to the width of the page count). We do not rely on
//! lexicographic order: files are matched with a regex and sorted by the
//! parsed page number.
//!
//! ## Why validate contiguity?
//!
//! pdftoppm renders pages in order and stops at the first fatal error, but
//! it can also skip a page it cannot parse and carry on. A gap in the
//! numbering means the document was only partially rendered; returning the
//! pages around the gap would silently drop content, so it fails the job.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 12,000 × 17,000 px image. `max_rendered_pixels` maps to `-scale-to`,
//! which caps the longest edge regardless of physical size.

use crate::config::ImageFormat;
use crate::error::Doc2ImgError;
use crate::job::StageKind;
use crate::output::OutputImage;
use crate::pipeline::process::{run_tool, scrub_path, tail_snippet, ToolFailure, ToolInvocation};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const STDERR_SNIPPET: usize = 600;

static PAGE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>.+)-(?P<num>\d+)\.(?P<ext>png|jpg)$").expect("static regex")
});

/// Rendering knobs passed through to pdftoppm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_rendered_pixels: Option<u32>,
    pub format: ImageFormat,
}

/// Build the argument vector for one rasterisation.
pub fn raster_invocation(
    pdftoppm: &Path,
    pdf: &Path,
    output_prefix: &Path,
    opts: &RenderOptions,
    timeout: Duration,
) -> ToolInvocation {
    let mut inv = ToolInvocation::new(pdftoppm, timeout)
        .arg(opts.format.pdftoppm_flag())
        .arg("-r")
        .arg(opts.dpi.to_string());
    if let Some(px) = opts.max_rendered_pixels {
        inv = inv.arg("-scale-to").arg(px.to_string());
    }
    inv = inv.arg(pdf.as_os_str()).arg(output_prefix.as_os_str());
    if let Some(dir) = output_prefix.parent() {
        inv = inv.cwd(dir);
    }
    inv
}

/// Rasterise `pdf` into `<output_prefix>-<N>.<ext>` files and return them
/// validated and in page order.
pub async fn rasterize(
    pdftoppm: &Path,
    pdf: &Path,
    output_prefix: &Path,
    opts: &RenderOptions,
    timeout: Duration,
) -> Result<Vec<OutputImage>, Doc2ImgError> {
    let inv = raster_invocation(pdftoppm, pdf, output_prefix, opts, timeout);
    let tool = inv.tool_name();

    let output = run_tool(&inv).await.map_err(|f| match f {
        ToolFailure::TimedOut { .. } => Doc2ImgError::ConversionTimeout {
            stage: StageKind::PdfToImages,
            tool: tool.clone(),
            timeout,
        },
        ToolFailure::Spawn(e) => Doc2ImgError::ToolUnavailable {
            stage: StageKind::PdfToImages,
            reason: format!("could not launch {tool}: {e}"),
        },
        ToolFailure::Wait(e) => Doc2ImgError::Internal(format!("waiting on {tool}: {e}")),
    })?;

    let dir = output_prefix
        .parent()
        .ok_or_else(|| Doc2ImgError::Internal("output prefix has no parent".into()))?;

    let failed = |detail: String, stderr: &str| Doc2ImgError::ConversionFailed {
        stage: StageKind::PdfToImages,
        tool: tool.clone(),
        exit_code: output.status.code(),
        detail,
        stderr: tail_snippet(&scrub_path(stderr, dir), STDERR_SNIPPET),
    };

    if !output.success() {
        return Err(failed(
            "rasterizer exited abnormally".to_string(),
            &output.stderr,
        ));
    }

    let prefix = output_prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let pages = list_page_files(dir, &prefix, opts.format)
        .await
        .map_err(|e| Doc2ImgError::workspace(dir, e))?;
    validate_sequence(&pages).map_err(|detail| failed(detail, &output.stderr))?;

    let images = read_dimensions(pages, opts.format)
        .await?
        .map_err(|detail| failed(detail, &output.stderr))?;

    info!(
        "Rasterised {} pages in {}ms",
        images.len(),
        output.elapsed.as_millis()
    );
    Ok(images)
}

/// List `<prefix>-<N>.<ext>` files in `dir`, sorted by `N`.
pub async fn list_page_files(
    dir: &Path,
    prefix: &str,
    format: ImageFormat,
) -> std::io::Result<Vec<(usize, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut pages = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(num) = parse_page_number(name, prefix, format) {
            pages.push((num, entry.path()));
        }
    }

    pages.sort_by_key(|(n, _)| *n);
    debug!("Found {} page files in {}", pages.len(), dir.display());
    Ok(pages)
}

/// Page number embedded in a rendered file name, if it is one of ours.
pub fn parse_page_number(name: &str, prefix: &str, format: ImageFormat) -> Option<usize> {
    let caps = PAGE_FILE.captures(name)?;
    if &caps["prefix"] != prefix || &caps["ext"] != format.extension() {
        return None;
    }
    caps["num"].parse().ok()
}

/// Require at least one page, numbered 1..=N without gaps or duplicates.
pub fn validate_sequence(pages: &[(usize, PathBuf)]) -> Result<(), String> {
    if pages.is_empty() {
        return Err("no page images were produced".to_string());
    }
    for (expected, (num, _)) in (1..).zip(pages.iter()) {
        if *num != expected {
            return Err(format!(
                "page images are not contiguous: expected page {expected}, found page {num} \
                 (partial or corrupt render)"
            ));
        }
    }
    Ok(())
}

/// Read each image header for its pixel size. Runs in `spawn_blocking`
/// because the `image` crate does synchronous I/O.
async fn read_dimensions(
    pages: Vec<(usize, PathBuf)>,
    format: ImageFormat,
) -> Result<Result<Vec<OutputImage>, String>, Doc2ImgError> {
    tokio::task::spawn_blocking(move || {
        pages
            .into_iter()
            .map(|(page, path)| match image::image_dimensions(&path) {
                Ok((width, height)) => Ok(OutputImage {
                    page,
                    path,
                    format,
                    width,
                    height,
                }),
                Err(e) => Err(format!("page {page} is not a readable image: {e}")),
            })
            .collect::<Result<Vec<_>, String>>()
    })
    .await
    .map_err(|e| Doc2ImgError::Internal(format!("Dimension task panicked: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RenderOptions {
        RenderOptions {
            dpi: 150,
            max_rendered_pixels: None,
            format: ImageFormat::Png,
        }
    }

    #[test]
    fn parses_padded_and_unpadded_numbers() {
        assert_eq!(parse_page_number("page-1.png", "page", ImageFormat::Png), Some(1));
        assert_eq!(parse_page_number("page-07.png", "page", ImageFormat::Png), Some(7));
        assert_eq!(parse_page_number("page-123.png", "page", ImageFormat::Png), Some(123));
    }

    #[test]
    fn ignores_foreign_files() {
        assert_eq!(parse_page_number("source.pdf", "page", ImageFormat::Png), None);
        assert_eq!(parse_page_number("page-1.jpg", "page", ImageFormat::Png), None);
        assert_eq!(parse_page_number("other-1.png", "page", ImageFormat::Png), None);
        assert_eq!(parse_page_number("page-.png", "page", ImageFormat::Png), None);
        assert_eq!(parse_page_number("page-2.jpg", "page", ImageFormat::Jpeg), Some(2));
    }

    #[test]
    fn validate_accepts_contiguous() {
        let pages: Vec<(usize, PathBuf)> =
            (1..=3).map(|n| (n, PathBuf::from(format!("page-{n}.png")))).collect();
        assert!(validate_sequence(&pages).is_ok());
    }

    #[test]
    fn validate_rejects_gap_and_empty() {
        let gap = vec![(1, PathBuf::from("a")), (3, PathBuf::from("b"))];
        let err = validate_sequence(&gap).unwrap_err();
        assert!(err.contains("expected page 2"), "got: {err}");

        assert!(validate_sequence(&[]).unwrap_err().contains("no page images"));

        let late_start = vec![(2, PathBuf::from("a"))];
        assert!(validate_sequence(&late_start).is_err());
    }

    #[test]
    fn invocation_arguments() {
        let inv = raster_invocation(
            Path::new("/usr/bin/pdftoppm"),
            Path::new("/w/source.pdf"),
            Path::new("/w/page"),
            &RenderOptions {
                max_rendered_pixels: Some(2000),
                ..opts()
            },
            Duration::from_secs(30),
        );
        let args: Vec<String> = inv
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-png", "-r", "150", "-scale-to", "2000", "/w/source.pdf", "/w/page"]
        );
        assert_eq!(inv.cwd.as_deref(), Some(Path::new("/w")));
    }

    #[tokio::test]
    async fn lists_pages_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for n in [10, 2, 1, 9] {
            std::fs::write(dir.path().join(format!("page-{n:02}.png")), b"x").unwrap();
        }
        std::fs::write(dir.path().join("source.pdf"), b"%PDF").unwrap();

        let pages = list_page_files(dir.path(), "page", ImageFormat::Png)
            .await
            .unwrap();
        let nums: Vec<usize> = pages.iter().map(|(n, _)| *n).collect();
        assert_eq!(nums, vec![1, 2, 9, 10]);
    }
}
