//! Semantic search over dataset records.
//!
//! Records are turned into one text string each, embedded once when the index
//! is built, and ranked against a query embedding by cosine similarity. A
//! failed build leaves the index unavailable instead of failing start-up;
//! searches on an unavailable index return nothing.
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

/// Embedding providers and similarity.
pub mod embedding;
/// Record index built from a dataset.
pub mod index;

pub use embedding::{
    ConfiguredEmbedder, EmbeddingProvider, HashingEmbedder, OllamaEmbeddingClient,
    cosine_similarity,
};
pub use index::{EmbeddingIndex, ScoredRecord, record_text, render_search_string};
