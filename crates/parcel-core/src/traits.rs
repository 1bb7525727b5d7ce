//! The seam between the query pipeline and the language model behind it.

use async_trait::async_trait;

use crate::{Context, Query, Response, Result};

/// A language model that answers pipeline prompts with plain text.
///
/// The interpreter sends the user's question and expects a JSON
/// classification back. The synthesizer sends an analysis prompt built from
/// the dataset schema and expects a script. Neither cares which service
/// produced the text, so tests swap in a scripted model here.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Short name recorded in [`Response::provider`] and in log lines.
    fn name(&self) -> &'static str;

    /// Whether credentials are configured. Does not contact the service.
    async fn is_available(&self) -> bool;

    /// Send `query` under the system prompt and sampling settings in
    /// `context`, returning the model's raw text.
    ///
    /// Fences and surrounding prose are left in place for the caller.
    ///
    /// # Errors
    ///
    /// `Error::Request` or `Error::Provider` for transport failures and
    /// server-side statuses, which callers may retry. `Error::InvalidResponse`
    /// when the request is rejected or the reply carries no content.
    async fn generate(&self, query: &Query, context: &Context) -> Result<Response>;
}
