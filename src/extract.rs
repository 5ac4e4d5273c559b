//! Extraction entry points.
//!
//! [`BillExtractor`] owns the resolved models and the config, and runs one
//! bill through fetch → model → parse → reconcile per call. It holds no
//! per-request state, so one instance is shared behind an `Arc` by every
//! concurrent HTTP request.

use crate::config::ExtractionConfig;
use crate::error::BillExtractError;
use crate::output::{Extraction, ResponseEnvelope};
use crate::pipeline::input::{self, Document};
use crate::pipeline::vision::{self, EdgequakeVisionModel, VisionModel};
use crate::pipeline::{parse, reconcile};
use crate::prompts::{extraction_prompt, SCHEMA_VERSION};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model used when a provider is named but no model is.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Runs bills through the extraction pipeline.
pub struct BillExtractor {
    config: ExtractionConfig,
    primary: Arc<dyn VisionModel>,
    fallback: Option<Arc<dyn VisionModel>>,
}

impl std::fmt::Debug for BillExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillExtractor")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|m| m.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

impl BillExtractor {
    /// Resolve the configured LLM provider(s) and build an extractor.
    ///
    /// # Errors
    /// [`BillExtractError::ProviderNotConfigured`] when no provider can be
    /// created, [`BillExtractError::InvalidConfig`] when a fallback model is
    /// requested without a provider name to build it from.
    pub fn new(config: ExtractionConfig) -> Result<Self, BillExtractError> {
        let resolved = resolve_provider(&config)?;
        info!("Using vision model {}", resolved.label);

        let fallback = match (&config.fallback_model, &resolved.provider_name) {
            (None, _) => None,
            (Some(model), Some(provider_name)) => {
                let provider = create_vision_provider(provider_name, model)?;
                info!("Retries fall back to {}/{}", provider_name, model);
                Some(Arc::new(EdgequakeVisionModel::new(
                    provider,
                    format!("{provider_name}/{model}"),
                    &config,
                )) as Arc<dyn VisionModel>)
            }
            (Some(_), None) => {
                return Err(BillExtractError::InvalidConfig(
                    "fallback_model needs a named provider (set provider_name or EDGEQUAKE_LLM_PROVIDER)"
                        .into(),
                ))
            }
        };

        let primary: Arc<dyn VisionModel> = Arc::new(EdgequakeVisionModel::new(
            resolved.provider,
            resolved.label,
            &config,
        ));

        Ok(Self {
            config,
            primary,
            fallback,
        })
    }

    /// Build an extractor around already-constructed models.
    pub fn with_models(
        config: ExtractionConfig,
        primary: Arc<dyn VisionModel>,
        fallback: Option<Arc<dyn VisionModel>>,
    ) -> Self {
        Self {
            config,
            primary,
            fallback,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Download the bill at `url` and extract its line items.
    ///
    /// # Errors
    /// Any request-level [`BillExtractError`]. Invalid individual items are
    /// not errors; they are listed in [`Extraction::dropped_items`].
    pub async fn extract(&self, url: &str) -> Result<Extraction, BillExtractError> {
        info!("Starting extraction: {}", url);
        let document = input::fetch_document(
            url,
            self.config.download_timeout_secs,
            self.config.max_document_bytes,
        )
        .await?;
        self.extract_document(&document).await
    }

    /// Extract line items from a document already in memory.
    pub async fn extract_document(
        &self,
        document: &Document,
    ) -> Result<Extraction, BillExtractError> {
        let start = Instant::now();
        let prompt = extraction_prompt(self.config.system_prompt.as_deref());

        let answer = vision::request_extraction(
            &self.primary,
            self.fallback.as_ref(),
            document,
            prompt,
            &self.config,
        )
        .await?;
        debug!("Model answer: {} chars", answer.text.len());

        let parsed = parse::parse_extraction(&answer.text)?;
        let result = reconcile::reconcile(parsed.pages);
        if !result.reconciled_amount.is_finite() {
            return Err(BillExtractError::MalformedExtraction {
                detail: format!(
                    "item amounts sum to {}, not a finite number",
                    result.reconciled_amount
                ),
            });
        }

        for page in &result.pagewise_line_items {
            for item in &page.bill_items {
                let gap = item.rate_quantity_gap();
                if gap > 0.0 {
                    debug!(
                        "Page {}: '{}' amount differs from rate × quantity by {}",
                        page.page_no, item.item_name, gap
                    );
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            schema = SCHEMA_VERSION,
            "Extraction complete: {} items on {} pages, reconciled {}, {} dropped, {} attempt(s), {}ms",
            result.total_item_count,
            result.pagewise_line_items.len(),
            result.reconciled_amount,
            parsed.dropped_items.len(),
            answer.attempts,
            duration_ms
        );

        Ok(Extraction {
            result,
            dropped_items: parsed.dropped_items,
            attempts: answer.attempts,
            model: answer.model,
            duration_ms,
        })
    }

    /// Run [`extract`](Self::extract) and fold the outcome into a response
    /// envelope. Never fails.
    pub async fn extract_envelope(&self, url: &str) -> ResponseEnvelope {
        match self.extract(url).await {
            Ok(extraction) => ResponseEnvelope::success(extraction.result),
            Err(e) => {
                warn!(kind = e.kind(), "Extraction failed for {}: {}", url, e);
                ResponseEnvelope::failure(e.to_string())
            }
        }
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct ResolvedProvider {
    provider: Arc<dyn LLMProvider>,
    label: String,
    /// Known when the provider was chosen by name; needed to build a
    /// fallback model on the same provider.
    provider_name: Option<String>,
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, BillExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        BillExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn named(provider_name: &str, model: &str) -> Result<ResolvedProvider, BillExtractError> {
    Ok(ResolvedProvider {
        provider: create_vision_provider(provider_name, model)?,
        label: format!("{provider_name}/{model}"),
        provider_name: Some(provider_name.to_string()),
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Gemini key** (`GEMINI_API_KEY`): Gemini with the configured or
///    default model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &ExtractionConfig) -> Result<ResolvedProvider, BillExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(ResolvedProvider {
            provider: Arc::clone(provider),
            label: config.model.clone().unwrap_or_else(|| "custom".to_string()),
            provider_name: config.provider_name.clone(),
        });
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return named(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return named(&prov, &env_model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return named("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| BillExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(ResolvedProvider {
        provider: llm_provider,
        label: "auto".to_string(),
        provider_name: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::vision::{ModelFailure, ModelReply};
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl VisionModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _: &Document, _: &str) -> Result<ModelReply, ModelFailure> {
            Ok(ModelReply {
                content: self.0.to_string(),
                ..Default::default()
            })
        }
    }

    fn extractor(answer: &'static str) -> BillExtractor {
        let config = ExtractionConfig::builder()
            .retry_backoff_ms(0)
            .build()
            .unwrap();
        BillExtractor::with_models(config, Arc::new(Fixed(answer)), None)
    }

    fn png() -> Document {
        Document::from_bytes("https://bills.test/a.png", b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec())
            .unwrap()
    }

    #[tokio::test]
    async fn extract_document_reconciles() {
        let ex = extractor(
            r#"{"pagewise_line_items":[{"page_no":"1","bill_items":[
                {"item_name":"A","item_amount":10.0,"item_rate":5.0,"item_quantity":2.0},
                {"item_name":"B","item_amount":2.5,"item_rate":2.5,"item_quantity":1.0}]}]}"#,
        );
        let out = ex.extract_document(&png()).await.unwrap();
        assert_eq!(out.result.total_item_count, 2);
        assert_eq!(out.result.reconciled_amount, 12.5);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.model, "fixed");
    }

    #[tokio::test]
    async fn invalid_url_envelope_is_failure() {
        let env = extractor("{}").extract_envelope("not-a-url").await;
        assert!(!env.is_success);
        assert!(env.data.is_none());
        assert!(env.error.unwrap().contains("not-a-url"));
    }

    #[test]
    fn debug_names_models() {
        let dbg = format!("{:?}", extractor("{}"));
        assert!(dbg.contains("fixed"));
    }
}
