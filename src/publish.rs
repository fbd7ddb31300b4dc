//! Optional publishing of page images to Supabase Storage.
//!
//! When credentials are configured the HTTP response carries public URLs
//! instead of inline base64. Objects land at
//! `<bucket>/images/<job_id>/page-<NNN>.<ext>`: the job id keeps concurrent
//! uploads of identically named documents apart, the zero-padded page number
//! keeps a bucket listing in page order.
//!
//! Publishing runs after the workspace is gone (pages are already in
//! memory), so a slow storage backend never holds a conversion permit.

use crate::error::Doc2ImgError;
use crate::output::PageImage;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Default bucket name.
pub const DEFAULT_BUCKET: &str = "presentations";

/// Objects uploaded concurrently per job.
const UPLOAD_CONCURRENCY: usize = 4;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Supabase Storage client for one bucket.
#[derive(Clone)]
pub struct Publisher {
    client: reqwest::Client,
    base_url: String,
    key: String,
    bucket: String,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("base_url", &self.base_url)
            .field("key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl Publisher {
    pub fn new(
        base_url: impl Into<String>,
        key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, Doc2ImgError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let key = key.into();
        let bucket = bucket.into();
        if base_url.is_empty() || key.is_empty() || bucket.is_empty() {
            return Err(Doc2ImgError::InvalidConfig(
                "Supabase URL, key and bucket must all be non-empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Doc2ImgError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            key,
            bucket,
        })
    }

    /// Build from `SUPABASE_URL`, `SUPABASE_KEY` and `SUPABASE_BUCKET`.
    ///
    /// Returns `Ok(None)` when URL or key is unset: publishing is optional.
    pub fn from_env() -> Result<Option<Self>, Doc2ImgError> {
        let url = std::env::var("SUPABASE_URL").ok().filter(|s| !s.is_empty());
        let key = std::env::var("SUPABASE_KEY").ok().filter(|s| !s.is_empty());
        let bucket = std::env::var("SUPABASE_BUCKET")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string());
        match (url, key) {
            (Some(url), Some(key)) => Self::new(url, key, bucket).map(Some),
            _ => Ok(None),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object path of one page inside the bucket.
    pub fn object_path(job_id: Uuid, page: &PageImage, page_count: usize) -> String {
        let width = page_count.to_string().len().max(3);
        format!(
            "images/{job_id}/page-{:0width$}.{}",
            page.page,
            extension_for_mime(page.mime_type)
        )
    }

    /// Endpoint an object is uploaded to.
    pub fn upload_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, object_path
        )
    }

    /// Public download URL of an object.
    pub fn public_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, object_path
        )
    }

    /// Upload every page and return the public URLs in page order.
    ///
    /// The first failed upload aborts the whole publish.
    pub async fn publish(
        &self,
        job_id: Uuid,
        pages: &[PageImage],
    ) -> Result<Vec<String>, Doc2ImgError> {
        let page_count = pages.len();
        let uploads: Vec<_> = pages
            .iter()
            .map(|page| {
                let path = Self::object_path(job_id, page, page_count);
                self.clone().upload_owned(path, page.clone())
            })
            .collect();
        let urls: Vec<String> = stream::iter(uploads)
            .buffered(UPLOAD_CONCURRENCY)
            .try_collect()
            .await?;

        info!(
            "Published {} pages to bucket '{}' under images/{}",
            urls.len(),
            self.bucket,
            job_id
        );
        Ok(urls)
    }

    /// Upload one page and return its public URL. Takes everything by value
    /// so the future is `'static + Send`.
    async fn upload_owned(self, path: String, page: PageImage) -> Result<String, Doc2ImgError> {
        self.upload_one(&path, page).await?;
        Ok(self.public_url(&path))
    }

    async fn upload_one(&self, path: &str, page: PageImage) -> Result<(), Doc2ImgError> {
        let url = self.upload_url(path);
        debug!("Uploading {} bytes to {}", page.bytes.len(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .header(reqwest::header::CONTENT_TYPE, page.mime_type)
            .body(page.bytes)
            .send()
            .await
            .map_err(|e| Doc2ImgError::PublishFailed(format!("page {}: {e}", page.page)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Doc2ImgError::PublishFailed(format!(
                "page {}: HTTP {status}: {}",
                page.page,
                crate::pipeline::process::tail_snippet(&body, 300)
            )));
        }
        Ok(())
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        _ => "png",
    }
}
