//! Configuration for the provider, embedding index, interpreter and analysis
//! runner.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Env var consulted when the config file carries no API key.
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Complete configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParcelConfig {
    /// Language-model provider settings
    pub provider: ProviderConfig,
    /// Embedding index settings
    pub embedding: EmbeddingConfig,
    /// Query interpreter settings
    pub interpreter: InterpreterConfig,
    /// Analysis synthesis and execution settings
    pub analysis: AnalysisConfig,
    /// Dataset location
    pub dataset: DatasetConfig,
}

/// Language-model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Model name
    pub model: String,
    /// API key; falls back to `GEMINI_API_KEY`
    pub api_key: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Timeout in seconds for a single model request
    pub timeout_seconds: u64,
    /// Attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for the retry delay, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_owned(),
            api_key: None,
            temperature: 0.2,
            timeout_seconds: 60,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl ProviderConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Which embedding backend encodes records and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Sentence embeddings served by a local Ollama instance
    #[default]
    Ollama,
    /// Deterministic token hashing, no external service
    Hashing,
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ollama => "ollama",
            Self::Hashing => "hashing",
        })
    }
}

/// Embedding index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Backend used to compute vectors
    pub backend: EmbeddingBackend,
    /// Ollama host, without port; `OLLAMA_HOST` overrides it
    pub host: String,
    /// Ollama port
    pub port: u16,
    /// Embedding model name
    pub model: String,
    /// Vector length for the hashing backend
    pub dimensions: usize,
    /// Columns concatenated into each record's text
    pub text_columns: Vec<String>,
    /// Default number of search results
    pub top_k: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            host: "http://localhost".to_owned(),
            port: 11434,
            model: "all-minilm".to_owned(),
            dimensions: 256,
            text_columns: ["address", "postcode", "district", "sector", "town", "region"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            top_k: 5,
        }
    }
}

/// Query interpreter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Re-apply the bedroom shorthand table to the raw query after parsing,
    /// overriding whatever the model extracted
    pub enforce_bedrooms: bool,
}

/// Analysis synthesis and execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Working directory of generated scripts; relative paths below resolve here
    pub work_dir: PathBuf,
    /// Directory the chart is written to
    pub plot_dir: String,
    /// File name of the chart, overwritten on every run
    pub plot_file: String,
    /// Program that runs generated code
    pub interpreter: String,
    /// Arguments placed before the script path
    pub interpreter_args: Vec<String>,
    /// Wall-clock limit for one script run, in seconds
    pub timeout_seconds: u64,
    /// Timestamp layout stated to the model for date-like columns
    pub date_format: String,
    /// Drop the first generated line containing this substring
    pub strip_marker: Option<String>,
    /// Fail when a successful run leaves no chart behind
    pub require_plot: bool,
    /// Rows of the dataset shown to the model
    pub sample_rows: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            plot_dir: "graphs".to_owned(),
            plot_file: "result.png".to_owned(),
            interpreter: "python3".to_owned(),
            interpreter_args: Vec::new(),
            timeout_seconds: 120,
            date_format: "%Y-%m-%dT%H:%M:%S.%fZ".to_owned(),
            strip_marker: None,
            require_plot: true,
            sample_rows: 5,
        }
    }
}

impl AnalysisConfig {
    /// Chart location relative to the script's working directory.
    pub fn relative_plot_path(&self) -> String {
        format!("{}/{}", self.plot_dir, self.plot_file)
    }

    /// Absolute-or-work-dir-relative chart directory.
    pub fn plot_dir_path(&self) -> PathBuf {
        self.work_dir.join(&self.plot_dir)
    }

    /// Fixed chart location.
    pub fn plot_path(&self) -> PathBuf {
        self.plot_dir_path().join(&self.plot_file)
    }

    /// Script wall-clock limit.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Dataset location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// JSON records export loaded at start-up
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/properties.json"),
        }
    }
}

impl ParcelConfig {
    /// Get the default config directory path (`~/.parcel`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".parcel"))
    }

    /// Get the default config file path (`~/.parcel/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with default
    /// values if it doesn't exist
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or fails validation
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("Failed to read {}: {error}", path.display()))
        })?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {} (api key {})",
            path.display(),
            if config.provider.api_key.is_some() {
                "present"
            } else {
                "missing"
            }
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let header = "# Parcel Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{}", self.to_toml()?))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the first offending field
    pub fn validate(&self) -> Result<()> {
        if self.provider.max_attempts == 0 {
            return Err(Error::Config("provider.max_attempts must be at least 1".to_owned()));
        }
        if self.provider.timeout_seconds == 0 {
            return Err(Error::Config("provider.timeout_seconds must be positive".to_owned()));
        }
        if self.analysis.timeout_seconds == 0 {
            return Err(Error::Config("analysis.timeout_seconds must be positive".to_owned()));
        }
        if self.analysis.plot_file.trim().is_empty() {
            return Err(Error::Config("analysis.plot_file must not be empty".to_owned()));
        }
        if self.analysis.interpreter.trim().is_empty() {
            return Err(Error::Config("analysis.interpreter must not be empty".to_owned()));
        }
        if self.embedding.text_columns.is_empty() {
            return Err(Error::Config("embedding.text_columns must not be empty".to_owned()));
        }
        if self.embedding.backend == EmbeddingBackend::Hashing && self.embedding.dimensions == 0 {
            return Err(Error::Config("embedding.dimensions must be positive".to_owned()));
        }
        Ok(())
    }

    /// API key for the model provider, checking config first, then the
    /// environment
    pub fn api_key(&self) -> Option<String> {
        self.provider
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| env::var(ENV_GEMINI_API_KEY).ok())
    }

    /// Copy with secrets masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.provider.api_key.is_some() {
            copy.provider.api_key = Some("********".to_owned());
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ParcelConfig::default();
        assert_eq!(config.embedding.top_k, 5);
        assert_eq!(config.analysis.relative_plot_path(), "graphs/result.png");
        assert_eq!(config.analysis.plot_path(), PathBuf::from("./graphs/result.png"));
        assert!(!config.interpreter.enforce_bedrooms);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
[provider]
model = "gemini-1.5-pro"
api_key = "test_key_123"

[embedding]
backend = "hashing"
top_k = 10

[analysis]
interpreter = "sh"
strip_marker = "python"
"#;

        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(toml_content.as_bytes())
            .expect("Failed to write to temp file");

        let config =
            ParcelConfig::load_from_file(temp_file.path()).expect("Failed to load config");

        assert_eq!(config.provider.model, "gemini-1.5-pro");
        assert_eq!(config.api_key(), Some("test_key_123".to_owned()));
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
        assert_eq!(config.embedding.top_k, 10);
        assert_eq!(config.embedding.port, 11434);
        assert_eq!(config.analysis.interpreter, "sh");
        assert_eq!(config.analysis.strip_marker.as_deref(), Some("python"));
        assert_eq!(config.analysis.plot_file, "result.png");
        assert_eq!(config.provider.max_attempts, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"[provider]\nmax_attempts = 0\n")
            .expect("Failed to write to temp file");

        let error = ParcelConfig::load_from_file(temp_file.path()).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ParcelConfig::default();
        config.analysis.timeout_seconds = 15;
        config.save_to_file(&path).expect("Failed to save config");

        let contents = fs::read_to_string(&path).expect("Failed to read config");
        assert!(contents.starts_with("# Parcel Configuration File"));

        let reloaded = ParcelConfig::load_from_file(&path).expect("Failed to reload config");
        assert_eq!(reloaded.analysis.timeout_seconds, 15);
    }

    #[test]
    fn test_redacted_masks_api_key() {
        let mut config = ParcelConfig::default();
        config.provider.api_key = Some("secret".to_owned());
        let shown = config.redacted().to_toml().expect("serialize");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("********"));
    }
}
