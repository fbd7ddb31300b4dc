//! Response assembly: load page images back into memory, or shape a failure.
//!
//! Runs while the workspace is still alive: once [`load_pages`] returns the
//! job no longer needs anything on disk, so the orchestrator can release the
//! workspace before handing the result to HTTP or CLI code.

use crate::error::{Doc2ImgError, ErrorKind};
use crate::output::{OutputImage, PageImage};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Files read concurrently per job.
const READ_CONCURRENCY: usize = 4;

/// Client-facing error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Doc2ImgError> for ErrorPayload {
    fn from(err: &Doc2ImgError) -> Self {
        Self {
            kind: err.kind(),
            message: err.public_message(),
        }
    }
}

/// Read every image into memory. Reads overlap, but results keep page order
/// (`buffered`, not `buffer_unordered`).
///
/// Each read owns its [`OutputImage`]: the returned future stays `Send`,
/// which axum handlers require.
pub async fn load_pages(images: &[OutputImage]) -> Result<Vec<PageImage>, Doc2ImgError> {
    let pages: Vec<PageImage> = stream::iter(images.to_vec())
        .map(load_page)
        .buffered(READ_CONCURRENCY)
        .try_collect()
        .await?;

    debug!(
        "Loaded {} pages ({} bytes)",
        pages.len(),
        pages.iter().map(|p| p.bytes.len()).sum::<usize>()
    );
    Ok(pages)
}

async fn load_page(img: OutputImage) -> Result<PageImage, Doc2ImgError> {
    let bytes = tokio::fs::read(&img.path)
        .await
        .map_err(|e| Doc2ImgError::workspace(&img.path, e))?;
    Ok(PageImage {
        page: img.page,
        mime_type: img.format.mime_type(),
        width: img.width,
        height: img.height,
        bytes,
    })
}
