//! Input resolution: download the bill at the request URL into memory.
//!
//! The document is sniffed by magic bytes rather than trusted by extension or
//! `Content-Type`: bill links are often pre-signed storage URLs with no
//! extension and a generic `application/octet-stream` type. Rejecting
//! anything we cannot name here gives the caller a clear
//! `UnprocessableDocument` instead of an opaque provider error.

use crate::error::BillExtractError;
use image::ImageFormat;
use tracing::{debug, info};

/// A fetched bill, ready to be encoded for the model.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source URL, kept for logging.
    pub url: String,
    pub bytes: Vec<u8>,
    /// Sniffed MIME type, e.g. `image/png`.
    pub mime_type: &'static str,
}

impl Document {
    /// Build a document from bytes already in memory, sniffing the type.
    pub fn from_bytes(
        url: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, BillExtractError> {
        let mime_type = sniff_mime(&bytes)?;
        Ok(Self {
            url: url.into(),
            bytes,
            mime_type,
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Identify the document type from its leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> Result<&'static str, BillExtractError> {
    if bytes.is_empty() {
        return Err(BillExtractError::UnprocessableDocument {
            reason: "document is empty".into(),
        });
    }
    if bytes.starts_with(b"%PDF") {
        return Ok("application/pdf");
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok("image/png"),
        Ok(ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(ImageFormat::WebP) => Ok("image/webp"),
        Ok(ImageFormat::Gif) => Ok("image/gif"),
        Ok(other) => Err(BillExtractError::UnprocessableDocument {
            reason: format!("unsupported image format {other:?}"),
        }),
        Err(_) => {
            let n = bytes.len().min(4);
            Err(BillExtractError::UnprocessableDocument {
                reason: format!(
                    "not a recognised image or PDF (first bytes: {:?})",
                    &bytes[..n]
                ),
            })
        }
    }
}

/// Download the document at `url`.
///
/// Runs once: a failed download is the caller's problem, not a transient
/// model fault, so it is not retried.
pub async fn fetch_document(
    url: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<Document, BillExtractError> {
    if !is_url(url) {
        return Err(BillExtractError::InvalidInput {
            input: url.to_string(),
        });
    }

    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BillExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            BillExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BillExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let mut response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(BillExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let mut bytes = match response.content_length() {
        Some(len) => {
            let len = usize::try_from(len).unwrap_or(usize::MAX);
            if len > max_bytes {
                return Err(too_large(len, max_bytes));
            }
            Vec::with_capacity(len)
        }
        None => Vec::new(),
    };

    // Content-Length is optional (chunked bodies), so the cap is enforced
    // while reading as well.
    while let Some(chunk) = response.chunk().await.map_err(map_send_err)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(too_large(bytes.len() + chunk.len(), max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }

    let document = Document::from_bytes(url, bytes)?;
    debug!(
        "Downloaded {} bytes ({})",
        document.bytes.len(),
        document.mime_type
    );
    Ok(document)
}

fn too_large(len: usize, max: usize) -> BillExtractError {
    BillExtractError::UnprocessableDocument {
        reason: format!("document is {len} bytes, limit is {max}"),
    }
}
