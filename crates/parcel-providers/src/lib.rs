//! Provider adapters for external language-model services.
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

/// Google Gemini provider implementation.
pub mod gemini;
/// Scripted provider for tests and offline runs.
pub mod mock;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
