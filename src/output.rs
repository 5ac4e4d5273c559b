//! Wire and result types.
//!
//! Field names are the public JSON contract of `POST /extract-bill-data`
//! and must not be renamed.

use crate::error::InvalidItem;
use serde::{Deserialize, Serialize};

/// Inbound request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    /// URL of the bill image.
    pub document: String,
}

/// One transactional row on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillItem {
    pub item_name: String,
    /// Line total as printed on the bill.
    pub item_amount: f64,
    /// Unit price.
    pub item_rate: f64,
    pub item_quantity: f64,
}

impl BillItem {
    /// Absolute difference between the printed amount and `rate × quantity`.
    ///
    /// Informational only; a gap is never grounds for dropping an item.
    pub fn rate_quantity_gap(&self) -> f64 {
        (self.item_amount - self.item_rate * self.item_quantity).abs()
    }
}

/// Line items extracted from one page, in extraction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_no: String,
    pub bill_items: Vec<BillItem>,
}

/// Extracted pages plus the totals derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub pagewise_line_items: Vec<Page>,
    pub total_item_count: usize,
    pub reconciled_amount: f64,
}

impl ExtractionResult {
    /// Recompute `total_item_count` and `reconciled_amount` from the pages.
    pub fn reconciled(self) -> Self {
        crate::pipeline::reconcile::reconcile(self.pagewise_line_items)
    }
}

/// The response body of the extraction endpoint.
///
/// `data` is present only when `is_success` is true, `error` only when it
/// is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(data: ExtractionResult) -> Self {
        Self {
            is_success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Full outcome of one successful extraction.
///
/// Carries diagnostics that are logged but not part of the wire contract.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub result: ExtractionResult,
    /// Items the validator rejected.
    pub dropped_items: Vec<InvalidItem>,
    /// Model calls made, including the successful one.
    pub attempts: u32,
    /// Name of the model that produced the accepted answer.
    pub model: String,
    pub duration_ms: u64,
}
