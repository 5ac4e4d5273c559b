//! VLM interaction: send the bill and prompt to the model, with bounded retry.
//!
//! [`VisionModel`] is the seam between the pipeline and whatever answers it.
//! Production uses [`EdgequakeVisionModel`], which adapts any
//! `edgequake_llm` provider; tests substitute scripted models.
//!
//! ## Retry Strategy
//!
//! At most `1 + max_retries` sequential attempts. Each is bounded by
//! `api_timeout`. Timeouts, transient provider errors and blank answers are
//! retried after an exponential backoff (`retry_backoff_ms * 2^(n-1)`), on
//! the fallback model when one is configured. A model that explicitly
//! rejects the document ends the loop at once: asking again will not make an
//! unsupported file readable.

use crate::config::ExtractionConfig;
use crate::error::BillExtractError;
use crate::pipeline::encode::encode_document;
use crate::pipeline::input::Document;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Instruction accompanying the image in the user turn.
const USER_INSTRUCTION: &str = "Extract the line items from this bill.";

/// A successful model answer.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Why a model call failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelFailure {
    /// Network fault, overload, rate limit: worth another attempt.
    Transient(String),
    /// The model cannot interpret this document. Not retried.
    Rejected(String),
}

/// Anything that can read a bill image given a prompt.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Label used in logs and in [`crate::output::Extraction::model`].
    fn name(&self) -> &str;

    async fn complete(&self, document: &Document, prompt: &str)
        -> Result<ModelReply, ModelFailure>;
}

/// [`VisionModel`] backed by an `edgequake_llm` provider.
pub struct EdgequakeVisionModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
}

impl EdgequakeVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            options: build_options(config),
        }
    }
}

#[async_trait]
impl VisionModel for EdgequakeVisionModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(
        &self,
        document: &Document,
        prompt: &str,
    ) -> Result<ModelReply, ModelFailure> {
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user_with_images(USER_INSTRUCTION, vec![encode_document(document)]),
        ];

        match self.provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => Ok(ModelReply {
                content: response.content,
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
            }),
            Err(e) => Err(classify_provider_error(&e.to_string())),
        }
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Phrases providers use when the input itself is the problem.
const REJECTION_MARKERS: &[&str] = &[
    "unsupported image",
    "unsupported mime",
    "unsupported file",
    "unsupported format",
    "invalid image",
    "image format",
    "could not process image",
    "unable to process input image",
    "content_filter",
    "content filter",
];

/// Sort a provider error message into retryable or not.
pub fn classify_provider_error(message: &str) -> ModelFailure {
    let lower = message.to_lowercase();
    if REJECTION_MARKERS.iter().any(|m| lower.contains(m)) {
        ModelFailure::Rejected(message.to_string())
    } else {
        ModelFailure::Transient(message.to_string())
    }
}

/// The accepted answer from [`request_extraction`].
#[derive(Debug, Clone)]
pub struct ModelAnswer {
    pub text: String,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Call the model until it answers, rejects the document, or attempts run out.
pub async fn request_extraction(
    primary: &Arc<dyn VisionModel>,
    fallback: Option<&Arc<dyn VisionModel>>,
    document: &Document,
    prompt: &str,
    config: &ExtractionConfig,
) -> Result<ModelAnswer, BillExtractError> {
    let start = Instant::now();
    let max_attempts = config.max_attempts();
    let mut last_err = String::from("no attempt made");

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "Retry {}/{} for {} after {}ms",
                attempt, config.max_retries, document.url, backoff
            );
            if backoff > 0 {
                sleep(Duration::from_millis(backoff)).await;
            }
        }

        let model = match fallback {
            Some(f) if attempt > 0 => f,
            _ => primary,
        };

        match timeout(config.api_timeout, model.complete(document, prompt)).await {
            Err(_) => {
                last_err = format!(
                    "{} timed out after {}ms",
                    model.name(),
                    config.api_timeout.as_millis()
                );
            }
            Ok(Err(ModelFailure::Rejected(reason))) => {
                warn!("{} rejected {}: {}", model.name(), document.url, reason);
                return Err(BillExtractError::UnprocessableDocument { reason });
            }
            Ok(Err(ModelFailure::Transient(e))) => {
                last_err = format!("{}: {}", model.name(), e);
            }
            Ok(Ok(reply)) if reply.content.trim().is_empty() => {
                last_err = format!("{} returned a blank response", model.name());
            }
            Ok(Ok(reply)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "{}: {} input tokens, {} output tokens, {}ms",
                    model.name(),
                    reply.input_tokens,
                    reply.output_tokens,
                    duration_ms
                );
                return Ok(ModelAnswer {
                    text: reply.content,
                    attempts: attempt + 1,
                    model: model.name().to_string(),
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                    duration_ms,
                });
            }
        }

        warn!("Attempt {} failed: {}", attempt + 1, last_err);
    }

    Err(BillExtractError::ExtractionUnavailable {
        attempts: max_attempts,
        last_error: last_err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of outcomes, one per call.
    struct Scripted {
        name: String,
        script: Mutex<Vec<Result<ModelReply, ModelFailure>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(name: &str, mut script: Vec<Result<ModelReply, ModelFailure>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                name: name.into(),
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl VisionModel for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(&self, _: &Document, _: &str) -> Result<ModelReply, ModelFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ModelFailure::Transient("script exhausted".into())))
        }
    }

    fn reply(text: &str) -> Result<ModelReply, ModelFailure> {
        Ok(ModelReply {
            content: text.into(),
            ..Default::default()
        })
    }

    fn doc() -> Document {
        Document {
            url: "https://bills.test/a.png".into(),
            bytes: vec![1, 2, 3],
            mime_type: "image/png",
        }
    }

    fn config(retries: u32) -> ExtractionConfig {
        ExtractionConfig::builder()
            .max_retries(retries)
            .retry_backoff_ms(0)
            .api_timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ExtractionConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn classify_errors() {
        assert_eq!(
            classify_provider_error("API error: Unsupported MIME type: image/tiff"),
            ModelFailure::Rejected("API error: Unsupported MIME type: image/tiff".into())
        );
        assert!(matches!(
            classify_provider_error("finish_reason=content_filter"),
            ModelFailure::Rejected(_)
        ));
        assert!(matches!(
            classify_provider_error("Network error: connection reset"),
            ModelFailure::Transient(_)
        ));
        assert!(matches!(
            classify_provider_error("HTTP 503 Service Unavailable"),
            ModelFailure::Transient(_)
        ));
    }

    #[tokio::test]
    async fn first_success_is_one_attempt() {
        let m = Scripted::new("primary", vec![reply("{}")]);
        let primary: Arc<dyn VisionModel> = m.clone();
        let answer = request_extraction(&primary, None, &doc(), "p", &config(2))
            .await
            .unwrap();
        assert_eq!(answer.attempts, 1);
        assert_eq!(answer.model, "primary");
        assert_eq!(m.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_then_success_retries() {
        let m = Scripted::new(
            "primary",
            vec![Err(ModelFailure::Transient("503".into())), reply("{}")],
        );
        let primary: Arc<dyn VisionModel> = m.clone();
        let answer = request_extraction(&primary, None, &doc(), "p", &config(2))
            .await
            .unwrap();
        assert_eq!(answer.attempts, 2);
    }

    #[tokio::test]
    async fn retries_go_to_fallback() {
        let p = Scripted::new("primary", vec![Err(ModelFailure::Transient("503".into()))]);
        let f = Scripted::new("fallback", vec![reply("{}")]);
        let primary: Arc<dyn VisionModel> = p.clone();
        let fallback: Arc<dyn VisionModel> = f.clone();
        let answer = request_extraction(&primary, Some(&fallback), &doc(), "p", &config(2))
            .await
            .unwrap();
        assert_eq!(answer.model, "fallback");
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let m = Scripted::new(
            "primary",
            vec![Err(ModelFailure::Rejected("unsupported image".into())), reply("{}")],
        );
        let primary: Arc<dyn VisionModel> = m.clone();
        let err = request_extraction(&primary, None, &doc(), "p", &config(2))
            .await
            .unwrap_err();
        assert!(matches!(err, BillExtractError::UnprocessableDocument { .. }));
        assert_eq!(m.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_answers_exhaust_to_unavailable() {
        let m = Scripted::new("primary", vec![reply(""), reply("  \n"), reply("\t")]);
        let primary: Arc<dyn VisionModel> = m.clone();
        let err = request_extraction(&primary, None, &doc(), "p", &config(2))
            .await
            .unwrap_err();
        match err {
            BillExtractError::ExtractionUnavailable { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("blank"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let m = Scripted::new("primary", vec![Err(ModelFailure::Transient("reset".into()))]);
        let primary: Arc<dyn VisionModel> = m.clone();
        let err = request_extraction(&primary, None, &doc(), "p", &config(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillExtractError::ExtractionUnavailable { attempts: 1, .. }
        ));
        assert_eq!(m.calls.load(Ordering::SeqCst), 1);
    }
}
