use async_trait::async_trait;
use parcel_core::{Context, Error, ModelProvider, ParcelConfig, Query, Response, Result, TokenUsage};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Instant;

/// Gemini REST API base URL.
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
/// Default model for Gemini.
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
/// Env var key for Gemini API key.
const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// Temperature used when neither the provider nor the context sets one.
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Google Gemini `generateContent` provider.
pub struct GeminiProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Gemini API key.
    api_key: String,
    /// Model name to use.
    model: String,
    /// Scheme and host requests are sent to.
    base_url: String,
    /// Temperature applied unless the context overrides it.
    temperature: f32,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_GEMINI_API_KEY.to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: GEMINI_API_URL.to_owned(),
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    /// Creates a new `GeminiProvider` from the `GEMINI_API_KEY` environment
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is not set.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(ENV_GEMINI_API_KEY)
            .map_err(|_| Error::MissingApiKey(ENV_GEMINI_API_KEY.to_owned()))?;
        Self::new(api_key)
    }

    /// Creates a provider from the `[provider]` config section, taking the
    /// key from the config file or the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured anywhere.
    pub fn from_config(config: &ParcelConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| Error::MissingApiKey(ENV_GEMINI_API_KEY.to_owned()))?;

        Ok(Self::new(api_key)?
            .with_model(config.provider.model.clone())
            .with_temperature(config.provider.temperature))
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Sets the default sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Points the provider at another host, such as a local stub server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Full endpoint for the configured model.
    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Request payload sent to the `generateContent` API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    /// Conversation turns; a single user turn here.
    contents: Vec<GeminiContent>,
    /// System instruction, omitted when the context has none.
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    /// Sampling settings.
    generation_config: GeminiGenerationConfig,
}

/// One turn of content made of text parts.
#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    /// Author of the turn (`user` or `model`); absent for system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    /// Text fragments of the turn.
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// A text fragment.
#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    /// Fragment text; non-text parts carry none.
    #[serde(default)]
    text: Option<String>,
}

/// Generation settings.
#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    /// Sampling temperature controlling response randomness.
    temperature: f32,
}

/// Response payload returned by Gemini.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    /// Candidate completions.
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    /// Token accounting information for the request.
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

/// A single candidate completion.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    /// Generated content, absent when the candidate was blocked.
    #[serde(default)]
    content: Option<GeminiContent>,
    /// Why generation stopped.
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Token usage metrics for a Gemini response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    /// Number of tokens in the prompt.
    #[serde(default)]
    prompt_token_count: u64,
    /// Number of tokens across candidates.
    #[serde(default)]
    candidates_token_count: u64,
}

impl GeminiResponse {
    /// Joined text of the first candidate.
    ///
    /// A candidate whose content is present but empty yields an empty
    /// string; judging an empty reply is left to the caller. A response
    /// without candidates, or a candidate with no content at all (blocked),
    /// is invalid.
    fn into_text(self) -> Result<String> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("No candidates in Gemini response".to_owned()))?;

        let reason = candidate.finish_reason.unwrap_or_default();
        let Some(content) = candidate.content else {
            return Err(Error::InvalidResponse(format!(
                "Gemini returned no content (finish reason: {reason})"
            )));
        };

        let text: String = content.parts.into_iter().filter_map(|part| part.text).collect();
        if text.is_empty() {
            tracing::warn!("Gemini returned an empty candidate (finish reason: {reason})");
        }
        Ok(text)
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, query: &Query, context: &Context) -> Result<Response> {
        let start = Instant::now();

        let system_instruction = (!context.system_prompt.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(context.system_prompt.clone()),
            }],
        });

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_owned()),
                parts: vec![GeminiPart {
                    text: Some(query.text.clone()),
                }],
            }],
            system_instruction,
            generation_config: GeminiGenerationConfig {
                temperature: context.temperature.unwrap_or(self.temperature),
            },
        };

        tracing::debug!("Gemini request to {} ({} chars)", self.model, query.text.len());

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Gemini API request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            let message = format!("Gemini API error {status}: {error_text}");
            return Err(
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    Error::Provider(message)
                } else {
                    Error::InvalidResponse(message)
                },
            );
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|err| Error::InvalidResponse(format!("Failed to parse Gemini response: {err}")))?;

        let tokens_used = gemini_response
            .usage_metadata
            .as_ref()
            .map(|usage| TokenUsage {
                input: usage.prompt_token_count,
                output: usage.candidates_token_count,
            })
            .unwrap_or_default();
        let text = gemini_response.into_text()?;
        let latency_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("Gemini response in {latency_ms}ms: {text}");

        Ok(Response {
            text,
            tokens_used,
            provider: format!("Gemini/{}", self.model),
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn provider_for(server: &Server) -> GeminiProvider {
        GeminiProvider::new("test-key".to_owned())
            .unwrap()
            .with_base_url(server.url())
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = GeminiProvider::new(String::new());
        assert!(matches!(result, Err(Error::MissingApiKey(_))));
    }

    #[test]
    fn config_sets_model_and_temperature() {
        let mut config = ParcelConfig::default();
        config.provider.api_key = Some("abc".to_owned());
        config.provider.model = "gemini-1.5-pro".to_owned();
        config.provider.temperature = 0.7;

        let provider = GeminiProvider::from_config(&config).unwrap();
        assert_eq!(provider.name(), "Gemini");
        assert_eq!(provider.model, "gemini-1.5-pro");
        assert!((provider.temperature - 0.7).abs() < f32::EPSILON);
        assert!(provider.endpoint().ends_with("/v1beta/models/gemini-1.5-pro:generateContent"));
    }

    #[tokio::test]
    async fn parses_candidate_text_and_usage() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [{"text": "find 2BHK"}]}],
                "systemInstruction": {"parts": [{"text": "answer in JSON"}]},
                "generationConfig": {"temperature": 0.0}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "{\"intent\":"}, {"text": "\"search\"}"}]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 5, "totalTokenCount": 17}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let provider = provider_for(&server);
        let context = Context::new("answer in JSON").with_temperature(0.0);
        let response = provider
            .generate(&Query::new("find 2BHK"), &context)
            .await
            .unwrap();

        assert_eq!(response.text, "{\"intent\":\"search\"}");
        assert_eq!(response.tokens_used.input, 12);
        assert_eq!(response.tokens_used.output, 5);
        assert_eq!(response.provider, "Gemini/gemini-1.5-flash");
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let error = provider_for(&server)
            .generate(&Query::new("q"), &Context::new(""))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Provider(_)));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn bad_request_is_permanent() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(400)
            .with_body("API key not valid")
            .create_async()
            .await;

        let error = provider_for(&server)
            .generate(&Query::new("q"), &Context::new(""))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidResponse(_)));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn empty_candidate_text_is_passed_through() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":""}]},"finishReason":"STOP"}]}"#)
            .create_async()
            .await;

        let response = provider_for(&server)
            .generate(&Query::new("q"), &Context::new(""))
            .await
            .unwrap();
        assert_eq!(response.text, "");
    }

    #[tokio::test]
    async fn missing_candidates_are_invalid() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let error = provider_for(&server)
            .generate(&Query::new("q"), &Context::new(""))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn blocked_candidate_is_invalid() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#)
            .create_async()
            .await;

        let error = provider_for(&server)
            .generate(&Query::new("q"), &Context::new(""))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("SAFETY"));
    }
}
