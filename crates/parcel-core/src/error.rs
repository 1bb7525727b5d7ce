use core::result::Result as CoreResult;
use std::io::Error as IoError;
use std::path::PathBuf;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for pipeline operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur anywhere in the query pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model provider failed in a way that may clear up on its own
    /// (rate limiting, server errors).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Required API key was not found.
    #[error("API key not found: {0}")]
    MissingApiKey(String),

    /// Model provider rejected the request or returned an unusable payload.
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    /// The dataset is missing, unreadable or empty.
    #[error("Dataset unavailable: {0}")]
    DataUnavailable(String),

    /// The model's interpretation of a query was empty, malformed or incomplete.
    #[error("Failed to interpret query: {0}")]
    Interpretation(String),

    /// Record embeddings could not be computed.
    #[error("Embedding build failed: {0}")]
    EmbeddingBuild(String),

    /// The model produced no usable analysis code.
    #[error("Code generation failed: {0}")]
    CodeGeneration(String),

    /// Generated analysis code exited with a non-zero status.
    #[error("Analysis script exited with status {status}: {stderr}")]
    Execution {
        /// Exit status of the child process (`-1` when killed by a signal).
        status: i32,
        /// Captured standard error, verbatim.
        stderr: String,
    },

    /// The analysis reported success but the expected chart was not written.
    #[error("Expected chart was not produced: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// An operation exceeded its wall-clock limit.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// Limit that was exceeded.
        seconds: u64,
    },

    /// The pipeline was driven through an illegal state transition.
    #[error("Pipeline contract violation: {0}")]
    Pipeline(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Returns `true` for transient external-service failures only. Validation
    /// failures are permanent and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Provider(_) | Self::Timeout { .. }
        )
    }
}
