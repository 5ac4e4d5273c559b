//! Pipeline stages for bill line-item extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ vision ──▶ parse ──▶ reconcile
//! (URL)     (base64)   (VLM)      (JSON)    (totals)
//! ```
//!
//! 1. [`input`]: download the bill and sniff its type from magic bytes
//! 2. [`encode`]: base64-wrap the bytes for the multimodal request body
//! 3. [`vision`]: drive the VLM call with timeout and bounded retry; the
//!    only stage with model network I/O
//! 4. [`parse`]: strip wrapper artefacts, parse JSON, drop invalid items
//! 5. [`reconcile`]: count items and sum their amounts

pub mod encode;
pub mod input;
pub mod parse;
pub mod reconcile;
pub mod vision;
