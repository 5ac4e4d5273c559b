//! CLI binary for medbill-extract.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `extract` runs one bill and prints the response envelope.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use medbill_extract::{server, BillExtractor, ExtractionConfig, ServerConfig};
use std::io;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on 0.0.0.0:8000
  medbill serve

  # Extract one bill and print the JSON envelope
  medbill extract https://example.com/bill.png --pretty

  # Gemini Pro with a Flash fallback for retries
  medbill serve --provider gemini --model gemini-2.5-pro --fallback-model gemini-2.0-flash

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  MEDBILL_HOST            Bind host for `serve` (default 0.0.0.0)
  MEDBILL_PORT            Bind port for `serve` (default 8000)
"#;

/// Extract line items from medical bills using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "medbill",
    version,
    about = "Extract line items from medical bills using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MEDBILL_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Bind host. Default: $MEDBILL_HOST or 0.0.0.0.
        #[arg(long)]
        host: Option<String>,

        /// Bind port. Default: $MEDBILL_PORT or 8000.
        #[arg(long)]
        port: Option<u16>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Extract a single bill and print the response envelope as JSON.
    Extract {
        /// HTTP/HTTPS URL of the bill image.
        url: String,

        /// Pretty-print the JSON.
        #[arg(long)]
        pretty: bool,

        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM model ID (e.g. gemini-2.5-pro, gpt-4.1).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Model used for retry attempts (same provider).
    #[arg(long, env = "MEDBILL_FALLBACK_MODEL")]
    fallback_model: Option<String>,

    /// Additional attempts after a failed model call.
    #[arg(long, env = "MEDBILL_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-attempt model call timeout in seconds.
    #[arg(long, env = "MEDBILL_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Document download timeout in seconds.
    #[arg(long, env = "MEDBILL_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "MEDBILL_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "MEDBILL_SYSTEM_PROMPT")]
    system_prompt: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve { host, port, model } => {
            let extractor = build_extractor(&model).await?;
            let mut server_config = ServerConfig::from_env();
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            info!("Starting server with config: {:?}", extractor.config());
            server::serve(&server_config, Arc::new(extractor))
                .await
                .with_context(|| format!("Server on {} failed", server_config.addr()))?;
        }
        Command::Extract { url, pretty, model } => {
            let extractor = build_extractor(&model).await?;
            let envelope = extractor.extract_envelope(&url).await;
            let json = if pretty {
                serde_json::to_string_pretty(&envelope)
            } else {
                serde_json::to_string(&envelope)
            }
            .context("Failed to serialise response")?;
            println!("{json}");
            if !envelope.is_success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Map CLI args to an extractor.
async fn build_extractor(args: &ModelArgs) -> Result<BillExtractor> {
    let mut builder = ExtractionConfig::builder()
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .temperature(args.temperature);

    if let Some(ref m) = args.model {
        builder = builder.model(m);
    }
    if let Some(ref p) = args.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref f) = args.fallback_model {
        builder = builder.fallback_model(f);
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    let config = builder.build().context("Invalid configuration")?;
    BillExtractor::new(config).context("Failed to initialise the vision model")
}
