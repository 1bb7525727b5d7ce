//! Mock provider for testing pipeline behaviour.
//!
//! Canned responses are selected by substring match against the prompt, so a
//! single mock can answer both the interpretation prompt and the analysis
//! prompt of one query. Failures can be queued ahead of the responses to
//! exercise retry handling.

use async_trait::async_trait;
use parcel_core::{Context, Error, IgnoreLock as _, ModelProvider, Query, Response, Result, TokenUsage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Mock provider that returns pre-defined responses based on prompt patterns.
#[derive(Clone)]
pub struct MockProvider {
    /// Label reported in `Response::provider`
    name: String,
    /// Pattern/response pairs, checked in insertion order
    responses: Arc<Mutex<Vec<(String, String)>>>,
    /// Response used when no pattern matches
    default_response: Arc<Mutex<Option<String>>>,
    /// Errors returned, one per call, before any response
    failures: Arc<Mutex<VecDeque<Error>>>,
    /// Artificial delay before answering
    latency: Option<Duration>,
    /// Prompts received, in call order
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Create a new mock provider with a given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: Arc::new(Mutex::new(None)),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            latency: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a pattern-based response. Earlier patterns win.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .lock_ignore_poison()
            .push((pattern.into(), response.into()));
        self
    }

    /// Set a default response for prompts that don't match any pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock_ignore_poison() = Some(response.into());
        self
    }

    /// Queue an error for the next unanswered call.
    #[must_use]
    pub fn with_failure(self, error: Error) -> Self {
        self.fail_next(error);
        self
    }

    /// Delay every answer, for timeout tests.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue an error on a provider that is already shared.
    pub fn fail_next(&self, error: Error) {
        self.failures.lock_ignore_poison().push_back(error);
    }

    /// Clear the call history.
    pub fn clear_history(&self) {
        self.call_history.lock_ignore_poison().clear();
    }

    /// Get the call history (every prompt received).
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock_ignore_poison().clone()
    }

    /// Get the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock_ignore_poison().len()
    }

    /// Find a matching response for the given prompt text.
    fn find_response(&self, prompt: &str) -> Option<String> {
        let responses = self.responses.lock_ignore_poison();

        if let Some((_, response)) = responses.iter().find(|(pattern, _)| pattern == prompt) {
            return Some(response.clone());
        }

        responses
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, query: &Query, _context: &Context) -> Result<Response> {
        self.call_history.lock_ignore_poison().push(query.text.clone());

        if let Some(latency) = self.latency {
            sleep(latency).await;
        }

        let failure = self.failures.lock_ignore_poison().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let text = match self.find_response(&query.text) {
            Some(text) => text,
            None => self
                .default_response
                .lock_ignore_poison()
                .clone()
                .unwrap_or_else(|| format!("Mock response for query: {}", query.text)),
        };

        Ok(Response {
            text,
            tokens_used: TokenUsage {
                input: query.text.len() as u64,
                output: 0,
            },
            provider: self.name.clone(),
            latency_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_exact_match() {
        let provider = MockProvider::new("test").with_response("hello", "world");

        let response = provider
            .generate(&Query::new("hello"), &Context::new("test"))
            .await
            .unwrap();
        assert_eq!(response.text, "world");
        assert_eq!(response.provider, "test");
    }

    #[tokio::test]
    async fn test_mock_provider_first_substring_pattern_wins() {
        let provider = MockProvider::new("test")
            .with_response("Classify", "{\"intent\":\"search\",\"parameters\":{}}")
            .with_response("property", "unused");

        let response = provider
            .generate(&Query::new("Classify this property query"), &Context::new(""))
            .await
            .unwrap();
        assert_eq!(response.text, "{\"intent\":\"search\",\"parameters\":{}}");
    }

    #[tokio::test]
    async fn test_mock_provider_default_response() {
        let provider = MockProvider::new("test").with_default_response("Default response");

        let response = provider
            .generate(&Query::new("unmatched query"), &Context::new("test"))
            .await
            .unwrap();
        assert_eq!(response.text, "Default response");
    }

    #[tokio::test]
    async fn test_mock_provider_queued_failures_come_first() {
        let provider = MockProvider::new("test")
            .with_default_response("ok")
            .with_failure(Error::Provider("503".to_owned()));

        let first = provider
            .generate(&Query::new("q"), &Context::new(""))
            .await;
        assert!(matches!(first, Err(Error::Provider(_))));

        let second = provider
            .generate(&Query::new("q"), &Context::new(""))
            .await
            .unwrap();
        assert_eq!(second.text, "ok");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_provider_call_history() {
        let provider = MockProvider::new("test");
        let context = Context::new("test");

        provider.generate(&Query::new("first query"), &context).await.unwrap();
        provider.generate(&Query::new("second query"), &context).await.unwrap();

        let history = provider.get_call_history();
        assert_eq!(history, vec!["first query", "second query"]);

        provider.clear_history();
        assert_eq!(provider.call_count(), 0);
    }
}
