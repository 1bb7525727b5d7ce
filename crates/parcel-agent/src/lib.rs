//! Query pipeline for property data.
//!
//! A natural-language query is interpreted by a language model into an
//! [`Intent`](parcel_core::Intent) and parameters, then routed:
//!
//! - **search** ranks dataset records with the
//!   [`EmbeddingIndex`](parcel_search::EmbeddingIndex)
//! - **analysis** asks the model for a script, runs it in a child process
//!   with a timeout, and returns its printed insights and chart
//!
//! [`Orchestrator`] ties the stages together; [`SessionContext`] owns the
//! long-lived state built once at start-up.
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

/// Bedroom shorthand (`2BHK`, `1RK`) normalization.
pub mod bedrooms;
/// Markdown code fence removal.
pub mod fence;
/// Natural-language query interpretation.
pub mod interpreter;
/// Query routing and pipeline state.
pub mod orchestrator;
/// Prompt templates.
pub mod prompts;
/// Retry and timeout policy for model calls.
pub mod retry;
/// Long-lived session state.
pub mod session;
/// Analysis code generation and execution.
pub mod synthesizer;

pub use bedrooms::Bedrooms;
pub use interpreter::QueryInterpreter;
pub use orchestrator::{AnalysisOutcome, Orchestrator, PipelineStage, QueryOutcome, SearchOutcome};
pub use retry::RetryPolicy;
pub use session::SessionContext;
pub use synthesizer::{AnalysisResult, AnalysisSynthesizer, GeneratedCode};
