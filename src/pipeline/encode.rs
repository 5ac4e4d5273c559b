//! Document encoding: raw bytes → base64 `ImageData` for the VLM request.
//!
//! Vision APIs accept images as base64 data embedded in the JSON request
//! body. The bytes are forwarded as downloaded; re-encoding a JPEG scan
//! would only add artefacts to small print.

use crate::pipeline::input::Document;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Encode a fetched document ready for the VLM API.
///
/// `detail: "high"` keeps providers that tile images (OpenAI) from
/// downscaling the scan to a single low-resolution tile, which loses the
/// digits in rate and quantity columns.
pub fn encode_document(doc: &Document) -> ImageData {
    let b64 = STANDARD.encode(&doc.bytes);
    debug!("Encoded {} → {} bytes base64", doc.mime_type, b64.len());

    ImageData::new(b64, doc.mime_type).with_detail("high")
}
