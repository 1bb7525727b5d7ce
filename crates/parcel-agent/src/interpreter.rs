use std::sync::Arc;

use parcel_core::{Context, Error, ModelProvider, Query, QueryInterpretation, Result};
use tracing::{debug, info};

use crate::bedrooms;
use crate::fence::strip_fences;
use crate::prompts::{INTERPRETATION_SYSTEM, interpretation_prompt};
use crate::retry::RetryPolicy;

/// Turns free-text queries into a routed [`QueryInterpretation`].
pub struct QueryInterpreter {
    provider: Arc<dyn ModelProvider>,
    retry: RetryPolicy,
    enforce_bedrooms: bool,
}

impl QueryInterpreter {
    /// Interpreter using `provider` with the default retry policy.
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            enforce_bedrooms: false,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// When set, bedroom shorthand in the raw query overrides whatever the
    /// model put in `bedrooms`.
    #[must_use]
    pub fn with_bedroom_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_bedrooms = enforce;
        self
    }

    /// Asks the model to classify `query` and extract its parameters.
    ///
    /// # Errors
    /// `Error::Interpretation` for an empty query or a reply that is empty,
    /// not JSON, or not exactly `{"intent": ..., "parameters": {...}}` with a
    /// known intent. Provider errors propagate after retries.
    pub async fn interpret(&self, query: &str) -> Result<QueryInterpretation> {
        if query.trim().is_empty() {
            return Err(Error::Interpretation("query is empty".to_owned()));
        }

        let prompt = Query::new(interpretation_prompt(query));
        let context = Context::new(INTERPRETATION_SYSTEM).with_temperature(0.0);
        debug!("Interpretation prompt: {}", prompt.text);

        let response = self
            .retry
            .run("interpretation", || self.provider.generate(&prompt, &context))
            .await?;
        debug!(
            "Interpretation response from {} ({} tokens, {}ms): {}",
            response.provider,
            response.tokens_used.total(),
            response.latency_ms,
            response.text
        );

        let mut interpretation = parse_interpretation(&response.text)?;

        if self.enforce_bedrooms
            && let Some(found) = bedrooms::normalize(query)
        {
            found.apply(&mut interpretation.parameters);
        }

        info!(
            "Interpreted query as {} with {} parameter(s)",
            interpretation.intent,
            interpretation.parameters.len()
        );
        Ok(interpretation)
    }
}

/// Parses a model reply, tolerating one surrounding code fence.
///
/// # Errors
/// `Error::Interpretation` describing what was wrong with the reply.
pub fn parse_interpretation(text: &str) -> Result<QueryInterpretation> {
    let body = strip_fences(text);
    if body.is_empty() {
        return Err(Error::Interpretation("empty response from model".to_owned()));
    }
    serde_json::from_str(body).map_err(|err| {
        Error::Interpretation(format!("response is not a valid interpretation: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_core::{Intent, ParamValue};

    #[test]
    fn parses_fenced_reply() {
        let reply = "```json\n{\"intent\": \"search\", \"parameters\": {\"bedrooms\": 2, \"location\": \"London\"}}\n```";
        let interpretation = parse_interpretation(reply).unwrap();
        assert_eq!(interpretation.intent, Intent::Search);
        assert_eq!(interpretation.parameters["bedrooms"], ParamValue::Integer(2));
    }

    #[test]
    fn rejects_malformed_replies() {
        for reply in [
            "",
            "```json\n```",
            "Sure! Here is the JSON you asked for.",
            "{\"intent\": \"search\"}",
            "{\"parameters\": {}}",
            "{\"intent\": \"summarize\", \"parameters\": {}}",
            "{\"intent\": \"search\", \"parameters\": \"none\"}",
            "{\"intent\": \"search\", \"parameters\": {}, \"confidence\": 0.9}",
            "[{\"intent\": \"search\", \"parameters\": {}}]",
        ] {
            let error = parse_interpretation(reply).unwrap_err();
            assert!(matches!(error, Error::Interpretation(_)), "{reply:?}");
        }
    }
}
