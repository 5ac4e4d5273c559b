//! Configuration types for bill extraction and for the HTTP service.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is an explicit value handed
//! to [`crate::extract::BillExtractor`] at construction; nothing is read from
//! process-wide state after that point.

use crate::error::BillExtractError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a bill extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use medbill_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gemini-2.5-pro")
///     .fallback_model("gemini-2.0-flash")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier, e.g. "gemini-2.5-pro".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Model used for retry attempts after the first one fails. Default: None
    /// (retries go to the primary model).
    pub fallback_model: Option<String>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction is transcription, so the model should stay close to
    /// deterministic.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    ///
    /// Long pharmacy bills with 50+ rows need well over 2 000 output tokens;
    /// a truncated answer is unparseable JSON.
    pub max_tokens: usize,

    /// Additional attempts after the first failed model call. Default: 2.
    ///
    /// Only timeouts, transient provider errors and blank answers are
    /// retried. A model that rejects the document is not.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt model call timeout. Default: 60 s.
    pub api_timeout: Duration,

    /// Document download timeout in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Largest document accepted, in bytes. Default: 20 MiB, the common
    /// inline-image limit of vision APIs.
    pub max_document_bytes: usize,

    /// Custom extraction prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            fallback_model: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout: Duration::from_secs(60),
            download_timeout_secs: 30,
            max_document_bytes: 20 * 1024 * 1024,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("fallback_model", &self.fallback_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout", &self.api_timeout)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Total model calls allowed for one request.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.config.fallback_model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn api_timeout_secs(self, secs: u64) -> Self {
        self.api_timeout(Duration::from_secs(secs))
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_document_bytes(mut self, n: usize) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, BillExtractError> {
        let c = &self.config;
        if c.max_retries > 10 {
            return Err(BillExtractError::InvalidConfig(format!(
                "max_retries must be 0–10, got {}",
                c.max_retries
            )));
        }
        if c.api_timeout.is_zero() {
            return Err(BillExtractError::InvalidConfig(
                "API timeout must be > 0".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(BillExtractError::InvalidConfig(
                "Download timeout must be > 0".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(BillExtractError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.system_prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(BillExtractError::InvalidConfig(
                "Custom system prompt is empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Service ──────────────────────────────────────────────────────────────

/// Bind address of the HTTP service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// Load from `MEDBILL_HOST` / `MEDBILL_PORT`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("MEDBILL_HOST").unwrap_or(defaults.host),
            port: std::env::var("MEDBILL_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
