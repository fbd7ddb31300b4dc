//! Image encoding: `PageImage` → base64 for inline JSON responses.
//!
//! JSON has no binary type. Without object storage configured, page images
//! travel inside the response body as standard base64; clients that want to
//! drop them into an `<img>` tag can use [`data_uri`].

use crate::output::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Encode a page's bytes as standard (padded) base64.
pub fn encode_page(page: &PageImage) -> String {
    let b64 = STANDARD.encode(&page.bytes);
    debug!("Encoded page {} → {} bytes base64", page.page, b64.len());
    b64
}

/// `data:<mime>;base64,<payload>` for a page.
pub fn data_uri(page: &PageImage) -> String {
    format!("data:{};base64,{}", page.mime_type, encode_page(page))
}
