use serde::{Deserialize, Serialize};

/// A prompt sent to a model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Prompt text.
    pub text: String,
}

impl Query {
    /// Creates a query from prompt text.
    pub fn new<T: Into<String>>(text: T) -> Self {
        Self { text: text.into() }
    }
}

/// Generation settings that accompany a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// System instruction; empty means provider default.
    pub system_prompt: String,
    /// Sampling temperature, when the caller wants to override the provider's.
    pub temperature: Option<f32>,
}

impl Context {
    /// Creates a context with the given system instruction.
    pub fn new<T: Into<String>>(system_prompt: T) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            temperature: None,
        }
    }

    /// Overrides the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Text returned by a model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Generated text, possibly wrapped in markdown fences.
    pub text: String,
    /// Token accounting reported by the provider.
    pub tokens_used: TokenUsage,
    /// Provider and model that produced the text.
    pub provider: String,
    /// Wall-clock latency of the request.
    pub latency_ms: u64,
}

/// Token accounting for one request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input: u64,
    /// Completion tokens.
    pub output: u64,
}

impl TokenUsage {
    /// Total tokens consumed.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input: 120,
            output: 30,
        };
        assert_eq!(usage.total(), 150);
        assert_eq!(TokenUsage::default().total(), 0);
    }

    #[test]
    fn context_temperature_override() {
        let context = Context::new("be terse").with_temperature(0.1);
        assert_eq!(context.system_prompt, "be terse");
        assert_eq!(context.temperature, Some(0.1));
        assert!(Context::new("").temperature.is_none());
    }
}
