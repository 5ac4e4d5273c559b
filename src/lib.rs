//! # medbill-extract
//!
//! Extract line items (medicine name, rate, quantity, amount) from scanned
//! medical invoices using Vision Language Models (VLMs).
//!
//! Reading the bill is delegated to a multimodal model. This crate owns
//! what surrounds that call: the prompt, the bounded retry, validation of
//! the model's JSON, and a reconciliation total computed from the items
//! themselves.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bill URL
//!  │
//!  ├─ 1. Input      download and sniff the document (PNG/JPEG/WebP/GIF/PDF)
//!  ├─ 2. Encode     bytes → base64 ImageData
//!  ├─ 3. VLM        prompt + image, timeout, up to 1 + max_retries attempts
//!  ├─ 4. Parse      strip fences, parse JSON, drop invalid items
//!  └─ 5. Reconcile  total_item_count + reconciled_amount
//! ```
//!
//! `reconciled_amount` is the sum of the extracted `item_amount`s. It is a
//! self-consistency signal, not a comparison against the printed total.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medbill_extract::{BillExtractor, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let extractor = BillExtractor::new(ExtractionConfig::default())?;
//!     let out = extractor.extract("https://example.com/bill.png").await?;
//!     println!("{} items, total {}",
//!         out.result.total_item_count,
//!         out.result.reconciled_amount);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `medbill` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ServerConfig};
pub use error::{BillExtractError, InvalidItem};
pub use extract::BillExtractor;
pub use output::{BillItem, DocumentRequest, Extraction, ExtractionResult, Page, ResponseEnvelope};
pub use pipeline::input::Document;
pub use pipeline::vision::{ModelFailure, ModelReply, VisionModel};
