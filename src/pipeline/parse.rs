//! Parsing and validation of the model's answer.
//!
//! Even with an explicit "no fences, no prose" prompt, vision models
//! sometimes wrap JSON in ```` ```json ```` fences or prefix a sentence. Known
//! wrappers are stripped before parsing; anything still unparseable is a
//! [`BillExtractError::MalformedExtraction`].
//!
//! Validation is explicit rather than a `#[derive(Deserialize)]` onto
//! [`BillItem`]: one bad row must cost one row, not the whole bill. Items
//! that fail are returned as [`InvalidItem`]s next to the accepted pages.

use crate::error::{BillExtractError, InvalidItem};
use crate::output::{BillItem, Page};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

/// Validated pages plus the items that were dropped on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedExtraction {
    pub pages: Vec<Page>,
    pub dropped_items: Vec<InvalidItem>,
}

// ── Wrapper stripping ────────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").unwrap());

static RE_INNER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(\{.*?\})\s*```").unwrap());

const INVISIBLE: &[char] = &['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'];

/// Remove known wrapper artefacts around the JSON payload.
///
/// Rules, in order:
/// 1. Trim whitespace and invisible characters (BOM, zero-width) at the edges
/// 2. Unwrap an outer markdown fence, with or without a language tag
/// 3. Otherwise, if prose surrounds a fenced `{...}` block, take that block
pub fn strip_wrappers(raw: &str) -> &str {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || INVISIBLE.contains(&c));

    if let Some(caps) = RE_OUTER_FENCE.captures(trimmed) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str();
        }
    }
    if !trimmed.starts_with('{') {
        if let Some(inner) = RE_INNER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
            return inner.as_str();
        }
    }
    trimmed
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Parse raw model text into validated pages.
///
/// # Errors
/// - [`BillExtractError::UnprocessableDocument`] when the model answered with
///   its `{"error": "..."}` refusal object
/// - [`BillExtractError::MalformedExtraction`] when the text is not JSON or
///   the page structure does not match the schema
pub fn parse_extraction(raw: &str) -> Result<ParsedExtraction, BillExtractError> {
    let payload = strip_wrappers(raw);
    let value: Value = serde_json::from_str(payload).map_err(|e| malformed(format!(
        "response is not valid JSON ({e}); starts with {:?}",
        excerpt(payload)
    )))?;

    let root = value
        .as_object()
        .ok_or_else(|| malformed("top-level JSON value is not an object"))?;

    let pages = match root.get("pagewise_line_items") {
        Some(Value::Array(pages)) => pages,
        Some(_) => return Err(malformed("'pagewise_line_items' is not an array")),
        None => {
            if let Some(reason) = root.get("error").and_then(Value::as_str) {
                return Err(BillExtractError::UnprocessableDocument {
                    reason: format!("model reported: {reason}"),
                });
            }
            return Err(malformed("missing 'pagewise_line_items'"));
        }
    };

    let mut parsed = ParsedExtraction::default();
    for (i, page) in pages.iter().enumerate() {
        let position = i + 1;
        let page = page
            .as_object()
            .ok_or_else(|| malformed(format!("page {position} is not an object")))?;
        parsed
            .pages
            .push(parse_page(page, position, &mut parsed.dropped_items)?);
    }

    for dropped in &parsed.dropped_items {
        warn!("Dropped line item: {}", dropped);
    }

    Ok(parsed)
}

fn parse_page(
    page: &Map<String, Value>,
    position: usize,
    dropped: &mut Vec<InvalidItem>,
) -> Result<Page, BillExtractError> {
    let page_no = match page.get("page_no") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => position.to_string(),
    };

    let raw_items: &[Value] = match page.get("bill_items") {
        Some(Value::Array(items)) => items.as_slice(),
        None | Some(Value::Null) => &[],
        Some(_) => {
            return Err(malformed(format!(
                "page {position}: 'bill_items' is not an array"
            )))
        }
    };

    let mut bill_items = Vec::with_capacity(raw_items.len());
    for (index, item) in raw_items.iter().enumerate() {
        match validate_item(item, position, index) {
            Ok(item) => bill_items.push(item),
            Err(invalid) => dropped.push(invalid),
        }
    }

    Ok(Page {
        page_no,
        bill_items,
    })
}

/// Validate a single `bill_items` entry.
pub fn validate_item(item: &Value, page: usize, index: usize) -> Result<BillItem, InvalidItem> {
    let obj = item
        .as_object()
        .ok_or(InvalidItem::NotAnObject { page, index })?;

    let item_name = match obj.get("item_name") {
        None | Some(Value::Null) => {
            return Err(InvalidItem::MissingField {
                page,
                index,
                field: "item_name".into(),
            })
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(InvalidItem::EmptyName { page, index })
        }
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(InvalidItem::NameNotAString { page, index }),
    };

    Ok(BillItem {
        item_name,
        item_amount: number_field(obj, "item_amount", page, index)?,
        item_rate: number_field(obj, "item_rate", page, index)?,
        item_quantity: number_field(obj, "item_quantity", page, index)?,
    })
}

fn number_field(
    obj: &Map<String, Value>,
    field: &str,
    page: usize,
    index: usize,
) -> Result<f64, InvalidItem> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(InvalidItem::MissingField {
            page,
            index,
            field: field.into(),
        }),
        Some(v) => v.as_f64().ok_or_else(|| InvalidItem::NotANumber {
            page,
            index,
            field: field.into(),
        }),
    }
}

fn malformed(detail: impl Into<String>) -> BillExtractError {
    BillExtractError::MalformedExtraction {
        detail: detail.into(),
    }
}

/// First 60 characters, for error messages.
fn excerpt(s: &str) -> String {
    match s.char_indices().nth(60) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
