//! Core types and traits for the parcel property query pipeline.
//!
//! This crate provides the error taxonomy, the language-model provider trait,
//! the immutable dataset model and the configuration shared by every other
//! crate in the workspace.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        reason = "Allow for tests"
    )
)]

/// Configuration loading and defaults.
pub mod config;
/// Immutable, typed tabular dataset.
pub mod dataset;
/// Error types and result definitions.
pub mod error;
/// Structured query interpretation shared by search and analysis.
pub mod interpretation;
/// Poison-tolerant mutex access.
pub mod sync;
/// Trait definitions for model providers.
pub mod traits;
/// Request and response types exchanged with model providers.
pub mod types;

pub use config::{
    AnalysisConfig, DatasetConfig, EmbeddingBackend, EmbeddingConfig, InterpreterConfig,
    ParcelConfig, ProviderConfig,
};
pub use dataset::{CellValue, ColumnKind, ColumnSpec, Dataset, Record, Schema};
pub use error::{Error, Result};
pub use interpretation::{Intent, ParamValue, Parameters, QueryInterpretation};
pub use sync::IgnoreLock;
pub use traits::ModelProvider;
pub use types::{Context, Query, Response, TokenUsage};
