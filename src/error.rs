//! Error types for the medbill-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BillExtractError`]: **Fatal for the request**: the document could not
//!   be fetched, the model was unreachable, or its answer was not the JSON we
//!   asked for. Returned as `Err(BillExtractError)` from
//!   [`crate::extract::BillExtractor::extract`] and folded into an
//!   `is_success: false` envelope at the service boundary.
//!
//! * [`InvalidItem`]: **Non-fatal**: a single line item in an otherwise
//!   well-formed answer is missing a field or has the wrong type. The item is
//!   dropped and recorded in [`crate::output::Extraction::dropped_items`];
//!   the other items still count.

use thiserror::Error;

/// All request-level errors returned by the medbill-extract library.
///
/// Per-item failures use [`InvalidItem`] and never surface here.
#[derive(Debug, Error)]
pub enum BillExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The `document` field is not an HTTP/HTTPS URL.
    #[error("Invalid document '{input}': not a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The URL was valid but downloading the document failed.
    #[error("Failed to download document '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Downloading the document exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The vision model was unreachable, timed out, or answered blank on
    /// every attempt.
    #[error("Extraction unavailable after {attempts} attempt(s): {last_error}")]
    ExtractionUnavailable { attempts: u32, last_error: String },

    /// The document cannot be interpreted: unsupported format, or the model
    /// explicitly refused it.
    #[error("Unprocessable document: {reason}")]
    UnprocessableDocument { reason: String },

    /// The model answered, but not with the JSON schema it was asked for.
    #[error("Malformed extraction: {detail}")]
    MalformedExtraction { detail: String },

    // ── Provider / config errors ──────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillExtractError {
    /// Stable snake_case label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BillExtractError::InvalidInput { .. } => "invalid_input",
            BillExtractError::DownloadFailed { .. } => "download_failed",
            BillExtractError::DownloadTimeout { .. } => "download_timeout",
            BillExtractError::ExtractionUnavailable { .. } => "extraction_unavailable",
            BillExtractError::UnprocessableDocument { .. } => "unprocessable_document",
            BillExtractError::MalformedExtraction { .. } => "malformed_extraction",
            BillExtractError::ProviderNotConfigured { .. } => "provider_not_configured",
            BillExtractError::InvalidConfig(_) => "invalid_config",
            BillExtractError::Internal(_) => "internal",
        }
    }
}

/// A non-fatal validation failure for a single line item.
///
/// `page` is the 1-based position of the page in the model's answer and
/// `index` the 0-based position of the item within that page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum InvalidItem {
    /// The entry in `bill_items` is not a JSON object.
    #[error("Page {page}, item {index}: not a JSON object")]
    NotAnObject { page: usize, index: usize },

    /// A required field is absent or `null`.
    #[error("Page {page}, item {index}: missing field '{field}'")]
    MissingField {
        page: usize,
        index: usize,
        field: String,
    },

    /// A numeric field holds something other than a JSON number.
    #[error("Page {page}, item {index}: field '{field}' is not a number")]
    NotANumber {
        page: usize,
        index: usize,
        field: String,
    },

    /// `item_name` is an empty or whitespace-only string.
    #[error("Page {page}, item {index}: item_name is empty")]
    EmptyName { page: usize, index: usize },

    /// `item_name` holds something other than a JSON string.
    #[error("Page {page}, item {index}: item_name is not a string")]
    NameNotAString { page: usize, index: usize },
}
