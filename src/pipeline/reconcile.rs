//! Reconciliation: derive item count and total from the extracted items.
//!
//! `reconciled_amount` is the sum of the extracted parts, nothing more. No
//! printed grand total is read or compared, so agreement here means the
//! result is self-consistent, not that it matches the bill.
//!
//! Summation runs in page order, then item order, with plain `f64`
//! addition. Floating-point addition is not associative, so the order is
//! fixed to keep totals reproducible for identical input.

use crate::output::{ExtractionResult, Page};

/// Attach `total_item_count` and `reconciled_amount` to the pages.
pub fn reconcile(pages: Vec<Page>) -> ExtractionResult {
    let (total_item_count, reconciled_amount) = totals(&pages);
    ExtractionResult {
        pagewise_line_items: pages,
        total_item_count,
        reconciled_amount,
    }
}

/// Item count and amount sum over `pages`.
pub fn totals(pages: &[Page]) -> (usize, f64) {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    for item in pages.iter().flat_map(|p| p.bill_items.iter()) {
        count += 1;
        sum += item.item_amount;
    }
    (count, sum)
}
