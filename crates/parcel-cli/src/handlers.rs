//! Command handlers for CLI operations

use anyhow::{Context as _, Result};
use parcel_agent::{Orchestrator, SessionContext};
use parcel_core::{Dataset, ModelProvider as _, ParcelConfig};
use parcel_providers::GeminiProvider;
use parcel_search::{ConfiguredEmbedder, EmbeddingProvider as _};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt as _, BufReader, stdin};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use crate::cli::Cli;
use crate::output;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "parcel=info,parcel_agent=info,parcel_search=info";

/// Configuration plus where it came from.
pub struct LoadedConfig {
    /// Effective configuration after command-line overrides
    pub config: ParcelConfig,
    /// File the configuration was read from
    pub path: Option<PathBuf>,
    /// Why defaults were used instead of the default config file
    fallback_reason: Option<String>,
}

impl LoadedConfig {
    /// Logs how the configuration was obtained. Call after logging is set up.
    pub fn report(&self) {
        match (&self.fallback_reason, &self.path) {
            (Some(reason), _) => {
                tracing::warn!("Failed to load config from ~/.parcel/config.toml: {reason}");
                tracing::warn!("Using default configuration");
            }
            (None, Some(path)) => tracing::debug!("Using config {}", path.display()),
            (None, None) => {}
        }
    }
}

/// Load configuration from `--config` or `~/.parcel/config.toml` and apply
/// command-line overrides.
///
/// An explicit `--config` file is created with defaults when missing and
/// must parse. Problems with the default file fall back to defaults.
///
/// # Errors
/// Returns an error if an explicit config file cannot be read, parsed or
/// created.
pub fn load_config(cli: &Cli) -> Result<LoadedConfig> {
    let mut loaded = if let Some(path) = &cli.config {
        let config = if path.exists() {
            ParcelConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        } else {
            let config = ParcelConfig::default();
            config
                .save_to_file(path)
                .with_context(|| format!("Failed to create config {}", path.display()))?;
            config
        };
        LoadedConfig {
            config,
            path: Some(path.clone()),
            fallback_reason: None,
        }
    } else {
        match ParcelConfig::load_or_create() {
            Ok(config) => LoadedConfig {
                config,
                path: ParcelConfig::config_path().ok(),
                fallback_reason: None,
            },
            Err(error) => LoadedConfig {
                config: ParcelConfig::default(),
                path: None,
                fallback_reason: Some(error.to_string()),
            },
        }
    };

    if let Some(dataset) = &cli.dataset {
        loaded.config.dataset.path.clone_from(dataset);
    }
    if let Some(work_dir) = &cli.work_dir {
        loaded.config.analysis.work_dir.clone_from(work_dir);
    }

    Ok(loaded)
}

/// Install the tracing subscriber, writing to stderr or to
/// `<work dir>/.parcel/debug.log`.
///
/// # Errors
/// Returns an error if the log file cannot be created.
pub fn init_logging(config: &ParcelConfig, to_file: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if to_file {
        let log_dir = config.analysis.work_dir.join(".parcel");
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create {}", log_dir.display()))?;

        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("debug.log"))?;

        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(Arc::new(log_file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init();
    }

    Ok(())
}

/// Load the dataset, connect the provider and build the search index.
///
/// # Errors
/// Returns an error if the dataset cannot be loaded or no API key is
/// configured. An unreachable embedding service only disables search.
async fn build_session(config: ParcelConfig) -> Result<SessionContext<ConfiguredEmbedder>> {
    let dataset_path = config.dataset.path.clone();
    let dataset = Dataset::load(&dataset_path)
        .with_context(|| format!("Failed to load dataset {}", dataset_path.display()))?;

    let provider = GeminiProvider::from_config(&config)
        .context("Set provider.api_key in the config file or the GEMINI_API_KEY environment variable")?;
    if !provider.is_available().await {
        tracing::warn!("Provider {} reports it is not ready", provider.name());
    }

    let embedder = ConfiguredEmbedder::from_config(&config.embedding);
    if let Err(error) = embedder.ensure_model_available().await {
        tracing::warn!("{error}");
    }

    Ok(SessionContext::build(config, Arc::new(dataset), Arc::new(provider), embedder).await)
}

/// Handle a single query
///
/// # Errors
/// Returns an error if start-up fails or the query cannot be answered
pub async fn handle_query(config: ParcelConfig, text: &str) -> Result<()> {
    let session = build_session(config).await?;
    let orchestrator = Orchestrator::new(&session);

    let outcome = orchestrator.process(text).await?;
    output::render_outcome(&session, &outcome)
}

/// Handle an interactive session reading queries from stdin
///
/// Query failures are printed and the loop continues.
///
/// # Errors
/// Returns an error if start-up fails or stdin cannot be read
pub async fn handle_repl(config: ParcelConfig) -> Result<()> {
    let session = build_session(config).await?;
    let orchestrator = Orchestrator::new(&session);
    output::render_banner(&session)?;

    let mut lines = BufReader::new(stdin()).lines();
    loop {
        output::render_prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        match orchestrator.process(query).await {
            Ok(outcome) => output::render_outcome(&session, &outcome)?,
            Err(error) => output::render_error(&error)?,
        }
    }

    Ok(())
}

/// Handle the `config` command
///
/// # Errors
/// Returns an error if the configuration cannot be serialized
pub fn handle_config(loaded: &LoadedConfig, full: bool) -> Result<()> {
    if full {
        output::render_toml(&loaded.config.redacted().to_toml()?)?;
    } else {
        output::render_config_summary(&loaded.config, loaded.path.as_deref())?;
    }
    Ok(())
}
