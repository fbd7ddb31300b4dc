//! HTTP surface: `POST /upload` and `GET /health` on axum.
//!
//! Handlers are thin. Everything about a job (validation, workspace,
//! stages, cleanup) happens in [`Converter::run`]; this module only moves
//! bytes out of a multipart body, maps [`Doc2ImgError`] onto status codes and
//! shapes the JSON.
//!
//! | Error kind | Status |
//! |---|---|
//! | `ValidationError`   | 400 |
//! | `ConversionTimeout` | 504 |
//! | `ConversionFailed`  | 500 |
//! | `InternalError`     | 500 |
//!
//! Bodies larger than the configured upload limit are cut off by
//! `DefaultBodyLimit` and answered with 413.

use crate::convert::Converter;
use crate::error::{Doc2ImgError, ErrorKind};
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::assemble::ErrorPayload;
use crate::pipeline::classify::DocumentFormat;
use crate::pipeline::encode;
use crate::publish::Publisher;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use engine_locate::Engine;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Slack on top of `max_upload_bytes` for multipart boundaries and headers.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<Converter>,
    /// Object storage for page images; inline base64 when `None`.
    pub publisher: Option<Publisher>,
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Errors a handler can return.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Conversion(#[from] Doc2ImgError),

    #[error("Malformed upload: {message}")]
    Multipart { status: StatusCode, message: String },
}

impl From<MultipartError> for ServerError {
    fn from(err: MultipartError) -> Self {
        ServerError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

/// Status code for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::ConversionTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ConversionFailed | ErrorKind::InternalError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::Conversion(err) => {
                if err.kind() == ErrorKind::InternalError {
                    error!("{}", err);
                }
                (status_for(err.kind()), ErrorPayload::from(err))
            }
            ServerError::Multipart { status, message } => (
                *status,
                ErrorPayload {
                    kind: ErrorKind::ValidationError,
                    message: message.clone(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ── Response types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub tools: ToolAvailability,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolAvailability {
    pub soffice: bool,
    pub pdftoppm: bool,
}

/// One page in an upload response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageEntry {
    pub page: usize,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// Base64 image bytes, when not published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Public URL, when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub filename: String,
    pub format: DocumentFormat,
    pub page_count: usize,
    pub images: Vec<ImageEntry>,
    /// Public URLs in page order, when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    pub stats: ConversionStats,
}

impl UploadResponse {
    fn new(output: ConversionOutput, urls: Option<Vec<String>>) -> Self {
        let images = output
            .pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let url = urls.as_ref().and_then(|u| u.get(i).cloned());
                ImageEntry {
                    page: page.page,
                    mime_type: page.mime_type.to_string(),
                    width: page.width,
                    height: page.height,
                    data: url.is_none().then(|| encode::encode_page(page)),
                    url,
                }
            })
            .collect();

        Self {
            job_id: output.job_id,
            filename: output.filename,
            format: output.format,
            page_count: output.pages.len(),
            images,
            image_urls: urls,
            stats: output.stats,
        }
    }
}

// ── Router ───────────────────────────────────────────────────────────────

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .converter
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/upload/", post(handle_upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

// ── Handlers ─────────────────────────────────────────────────────────────

pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "doc2img".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tools: ToolAvailability {
            soffice: state.converter.tool_path(Engine::Soffice).is_some(),
            pdftoppm: state.converter.tool_path(Engine::Pdftoppm).is_some(),
        },
    })
}

pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let upload = read_upload(&mut multipart).await?;
    let output = state
        .converter
        .run(&upload.bytes, &upload.filename, upload.content_type.as_deref())
        .await?;

    let urls = match &state.publisher {
        Some(publisher) => Some(publisher.publish(output.job_id, &output.pages).await?),
        None => None,
    };

    Ok(Json(UploadResponse::new(output, urls)))
}

struct Upload {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Take the `file` field, or else the first field that carries a filename.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ServerError> {
    let mut fallback: Option<Upload> = None;

    while let Some(field) = multipart.next_field().await? {
        let is_file_field = field.name() == Some("file");
        if !is_file_field && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?.to_vec();
        debug!(
            "Multipart field {:?}: '{}' ({} bytes)",
            if is_file_field { "file" } else { "fallback" },
            filename,
            bytes.len()
        );
        let upload = Upload {
            filename,
            content_type,
            bytes,
        };

        if is_file_field {
            return Ok(upload);
        }
        fallback = Some(upload);
    }

    fallback.ok_or(ServerError::Conversion(Doc2ImgError::MissingUpload))
}
