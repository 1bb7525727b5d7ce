//! Embedding providers: Ollama for real sentence vectors, token hashing for
//! offline use.

use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;
use parcel_core::{EmbeddingBackend, EmbeddingConfig, Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::fmt::Display;
use std::future::Future;
use std::hash::{Hash as _, Hasher as _};

/// A single embedding vector
pub type Embedding = Vec<f32>;

/// Trait for generating embeddings from text
pub trait EmbeddingProvider: Send + Sync {
    /// Ensure the embedding model is available
    ///
    /// # Errors
    /// Returns an error if the model is not available or cannot be reached
    fn ensure_model_available(&self) -> impl Future<Output = Result<()>> + Send;

    /// Generate embedding for text
    ///
    /// # Errors
    /// Returns an error if embedding generation fails
    fn embed(&self, text: &str) -> impl Future<Output = Result<Embedding>> + Send;

    /// Embed multiple texts in one request, one vector per text in order
    ///
    /// # Errors
    /// Returns an error if any embedding generation fails
    fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> impl Future<Output = Result<Vec<Embedding>>> + Send;
}

/// Ollama embedding client
pub struct OllamaEmbeddingClient {
    ollama: Ollama,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Client for `model` served at `host:port`.
    pub fn new(host: impl Into<String>, port: u16, model: impl Into<String>) -> Self {
        Self {
            ollama: Ollama::new(host.into(), port),
            model: model.into(),
        }
    }

    /// Client from the `[embedding]` config section; `OLLAMA_HOST`
    /// overrides the configured host.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| config.host.clone());
        Self::new(host, config.port, config.model.clone())
    }

    /// Embedding model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_error(&self, error: &impl Display) -> Error {
        let detail = error.to_string();
        if detail.contains("model") && detail.contains("not found") {
            Error::EmbeddingBuild(format!(
                "Embedding model '{}' not found. Run: ollama pull {}",
                self.model, self.model
            ))
        } else {
            Error::EmbeddingBuild(format!("Embedding generation failed: {detail}"))
        }
    }
}

impl EmbeddingProvider for OllamaEmbeddingClient {
    async fn ensure_model_available(&self) -> Result<()> {
        let models = self.ollama.list_local_models().await.map_err(|error| {
            Error::EmbeddingBuild(format!(
                "Failed to connect to Ollama: {error}.\n\nPlease ensure Ollama is installed and running:\n  - Install from: https://ollama.ai\n  - Start with: ollama serve"
            ))
        })?;

        if models.iter().any(|model| model.name.contains(&self.model)) {
            Ok(())
        } else {
            Err(Error::EmbeddingBuild(format!(
                "Embedding model '{}' not found. Run: ollama pull {}",
                self.model, self.model
            )))
        }
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), text.to_owned().into());

        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| self.request_error(&error))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingBuild("No embeddings returned".to_owned()))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::default());
        }

        let request = GenerateEmbeddingsRequest::new(self.model.clone(), texts.into());

        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| self.request_error(&error))?;

        Ok(response.embeddings)
    }
}

/// Deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets. Texts sharing tokens score higher under cosine similarity, which
/// is enough for offline runs and for tests that need stable rankings.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Embedder producing vectors of length `dimensions` (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Vector for `text`; all zeros when it has no tokens.
    pub fn vector(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0; self.dimensions];
        for token in text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    async fn ensure_model_available(&self) -> Result<()> {
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }
}

/// Embedder chosen by `embedding.backend`.
pub enum ConfiguredEmbedder {
    /// Ollama-served model
    Ollama(OllamaEmbeddingClient),
    /// Local token hashing
    Hashing(HashingEmbedder),
}

impl ConfiguredEmbedder {
    /// Builds the configured backend.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        match config.backend {
            EmbeddingBackend::Ollama => Self::Ollama(OllamaEmbeddingClient::from_config(config)),
            EmbeddingBackend::Hashing => Self::Hashing(HashingEmbedder::new(config.dimensions)),
        }
    }
}

impl EmbeddingProvider for ConfiguredEmbedder {
    async fn ensure_model_available(&self) -> Result<()> {
        match self {
            Self::Ollama(client) => client.ensure_model_available().await,
            Self::Hashing(embedder) => embedder.ensure_model_available().await,
        }
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        match self {
            Self::Ollama(client) => client.embed(text).await,
            Self::Hashing(embedder) => embedder.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        match self {
            Self::Ollama(client) => client.embed_batch(texts).await,
            Self::Hashing(embedder) => embedder.embed_batch(texts).await,
        }
    }
}

/// Calculate cosine similarity between two vectors.
///
/// Mismatched lengths and zero vectors score `0.0`.
pub fn cosine_similarity(vector_a: &[f32], vector_b: &[f32]) -> f32 {
    if vector_a.len() != vector_b.len() {
        return 0.0;
    }

    let dot_product: f32 = vector_a
        .iter()
        .zip(vector_b.iter())
        .map(|(left, right)| left * right)
        .sum();
    let magnitude_a = vector_a.iter().map(|value| value * value).sum::<f32>().sqrt();
    let magnitude_b = vector_b.iter().map(|value| value * value).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
