//! Configuration types for document-to-image conversion.
//!
//! Every knob a conversion service needs lives in [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. One struct is shared (behind an `Arc`) by the
//! HTTP handlers, the CLI and the orchestrator, so a run can be reproduced
//! from a single `Debug` dump.
//!
//! # Design choice: builder over constructor
//! Most deployments only change the timeouts and the upload directory. The
//! builder lets callers set what they care about and rely on documented
//! defaults for the rest; out-of-range numbers are clamped at the setter and
//! structural problems surface from [`ServiceConfigBuilder::build`].

use crate::error::Doc2ImgError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the conversion service.
///
/// Built via [`ServiceConfig::builder()`] or using
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doc2img::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .upload_dir("/var/lib/doc2img")
///     .office_timeout(Duration::from_secs(90))
///     .dpi(200)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Root directory under which per-job workspaces are created. Default: `uploads`.
    ///
    /// Created on start-up if missing. Each job gets its own
    /// `job-<uuid>-<random>` subdirectory, removed when the job ends.
    pub upload_dir: PathBuf,

    /// Budget for the office → PDF stage. Default: 60 s.
    ///
    /// LibreOffice cold-starts in 2–5 s; a 100-slide deck converts in well
    /// under a minute on modest hardware. Anything beyond that is a stuck
    /// import filter or a modal dialog nobody will ever dismiss.
    pub office_timeout: Duration,

    /// Budget for the PDF → images stage. Default: 30 s.
    pub raster_timeout: Duration,

    /// Maximum number of jobs running external tools at once. Default: 4.
    ///
    /// Each LibreOffice instance takes 200–400 MB of RAM. Requests beyond the
    /// limit wait for a permit; that wait does not count against the stage
    /// timeouts.
    pub max_concurrent_conversions: usize,

    /// Rendering DPI passed to pdftoppm. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on the longest edge of a rendered page, in pixels. Default: none.
    ///
    /// Maps to `pdftoppm -scale-to`. Protects against poster-sized pages
    /// producing enormous images at the configured DPI.
    pub max_rendered_pixels: Option<u32>,

    /// Encoding of the page images. Default: [`ImageFormat::Png`].
    pub image_format: ImageFormat,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Explicit path to `soffice`. If None, searched via `engine-locate`.
    pub soffice_path: Option<PathBuf>,

    /// Explicit path to `pdftoppm`. If None, searched via `engine-locate`.
    pub pdftoppm_path: Option<PathBuf>,

    /// Per-job progress callback. Default: None (no-op).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            office_timeout: Duration::from_secs(60),
            raster_timeout: Duration::from_secs(30),
            max_concurrent_conversions: 4,
            dpi: 150,
            max_rendered_pixels: None,
            image_format: ImageFormat::default(),
            max_upload_bytes: 50 * 1024 * 1024,
            soffice_path: None,
            pdftoppm_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("upload_dir", &self.upload_dir)
            .field("office_timeout", &self.office_timeout)
            .field("raster_timeout", &self.raster_timeout)
            .field("max_concurrent_conversions", &self.max_concurrent_conversions)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("image_format", &self.image_format)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("soffice_path", &self.soffice_path)
            .field("pdftoppm_path", &self.pdftoppm_path)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn office_timeout(mut self, timeout: Duration) -> Self {
        self.config.office_timeout = timeout;
        self
    }

    pub fn raster_timeout(mut self, timeout: Duration) -> Self {
        self.config.raster_timeout = timeout;
        self
    }

    pub fn max_concurrent_conversions(mut self, n: usize) -> Self {
        self.config.max_concurrent_conversions = n.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = Some(px.max(100));
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = Some(path.into());
        self
    }

    pub fn pdftoppm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdftoppm_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Doc2ImgError> {
        let c = &self.config;
        if c.office_timeout.is_zero() || c.raster_timeout.is_zero() {
            return Err(Doc2ImgError::InvalidConfig(
                "Stage timeouts must be greater than zero".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(Doc2ImgError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.upload_dir.as_os_str().is_empty() {
            return Err(Doc2ImgError::InvalidConfig(
                "upload_dir must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Encoding of rendered page images.
///
/// PNG is lossless and the right choice for slides and text. JPEG is 3–5×
/// smaller for photo-heavy pages at the cost of ringing around text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Output-format flag understood by pdftoppm.
    pub fn pdftoppm_flag(self) -> &'static str {
        match self {
            ImageFormat::Png => "-png",
            ImageFormat::Jpeg => "-jpeg",
        }
    }

    /// File extension pdftoppm writes for this format.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => f.write_str("png"),
            ImageFormat::Jpeg => f.write_str("jpeg"),
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = Doc2ImgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            other => Err(Doc2ImgError::InvalidConfig(format!(
                "Unknown image format '{other}' (expected png or jpeg)"
            ))),
        }
    }
}
