use std::sync::Arc;

use parcel_core::{Dataset, ModelProvider, ParcelConfig};
use parcel_search::{EmbeddingIndex, EmbeddingProvider};

/// State built once at start-up and shared by every query: configuration,
/// dataset, model provider and the record index.
pub struct SessionContext<E> {
    /// Effective configuration
    pub config: ParcelConfig,
    /// Loaded dataset
    pub dataset: Arc<Dataset>,
    /// Language-model provider
    pub provider: Arc<dyn ModelProvider>,
    /// Record embeddings, possibly unavailable
    pub index: Arc<EmbeddingIndex<E>>,
}

impl<E: EmbeddingProvider> SessionContext<E> {
    /// Builds the index and assembles the session. Index failures leave the
    /// index unavailable rather than failing.
    pub async fn build(
        config: ParcelConfig,
        dataset: Arc<Dataset>,
        provider: Arc<dyn ModelProvider>,
        embedder: E,
    ) -> Self {
        let index =
            EmbeddingIndex::build(&dataset, embedder, &config.embedding.text_columns).await;
        tracing::info!(
            "Session ready: {} records, search index {}",
            dataset.len(),
            if index.is_available() {
                "available"
            } else {
                "unavailable"
            }
        );

        Self {
            config,
            dataset,
            provider,
            index: Arc::new(index),
        }
    }
}
