use parcel_core::{Dataset, Error, Parameters, Record};
use tracing::{error, info, warn};

use crate::embedding::{Embedding, EmbeddingProvider, cosine_similarity};

/// A search hit with its similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRecord {
    /// Record position in the dataset
    pub index: usize,
    /// Cosine similarity to the search string
    pub score: f32,
}

/// Record vectors computed once from a dataset.
///
/// The index is either ready, holding one vector per record, or unavailable
/// after a failed build. It never changes after construction.
pub struct EmbeddingIndex<P> {
    provider: P,
    vectors: Option<Vec<Embedding>>,
}

/// Text of one record: the configured columns joined with single spaces,
/// missing cells and unknown columns contributing empty strings.
pub fn record_text(record: &Record<'_>, text_columns: &[String]) -> String {
    text_columns
        .iter()
        .map(|column| record.text(column))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Query followed by `key:value` terms for every parameter.
pub fn render_search_string(query: &str, parameters: &Parameters) -> String {
    let terms = parameters
        .iter()
        .map(|(key, value)| format!("{key}:{value}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{query} {terms}")
}

impl<P: EmbeddingProvider> EmbeddingIndex<P> {
    /// Embeds every record of `dataset` in one batch.
    ///
    /// Never fails: a provider error or a vector count that differs from the
    /// record count is logged and leaves the index unavailable.
    pub async fn build(dataset: &Dataset, provider: P, text_columns: &[String]) -> Self {
        let unknown = dataset.missing_columns(
            &text_columns.iter().map(String::as_str).collect::<Vec<_>>(),
        );
        if !unknown.is_empty() {
            warn!("Text columns not in dataset, treated as empty: {unknown:?}");
        }

        let texts: Vec<String> = dataset
            .records()
            .map(|record| record_text(&record, text_columns))
            .collect();
        let expected = texts.len();

        let vectors = match provider.embed_batch(texts).await {
            Ok(vectors) if vectors.len() == expected => {
                info!("Embedded {expected} records");
                Some(vectors)
            }
            Ok(vectors) => {
                let error = Error::EmbeddingBuild(format!(
                    "provider returned {} vectors for {expected} records",
                    vectors.len()
                ));
                error!("Search index unavailable: {error}");
                None
            }
            Err(build_error) => {
                error!("Search index unavailable: {build_error}");
                None
            }
        };

        Self { provider, vectors }
    }

    /// Whether record vectors were computed.
    pub fn is_available(&self) -> bool {
        self.vectors.is_some()
    }

    /// Number of indexed records; zero when unavailable.
    pub fn len(&self) -> usize {
        self.vectors.as_ref().map_or(0, Vec::len)
    }

    /// Whether no records are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record positions most similar to the query and its parameters,
    /// best first, at most `top_k`.
    pub async fn search(&self, query: &str, parameters: &Parameters, top_k: usize) -> Vec<usize> {
        self.search_scored(query, parameters, top_k)
            .await
            .into_iter()
            .map(|hit| hit.index)
            .collect()
    }

    /// Like [`Self::search`], keeping scores. Equal scores keep record order.
    pub async fn search_scored(
        &self,
        query: &str,
        parameters: &Parameters,
        top_k: usize,
    ) -> Vec<ScoredRecord> {
        let Some(vectors) = &self.vectors else {
            warn!("Search requested but the index is unavailable");
            return Vec::new();
        };
        if top_k == 0 {
            return Vec::new();
        }

        let search_string = render_search_string(query, parameters);
        tracing::debug!("Search string: {search_string}");

        let query_vector = match self.provider.embed(&search_string).await {
            Ok(vector) => vector,
            Err(embed_error) => {
                error!("Failed to encode search query: {embed_error}");
                return Vec::new();
            }
        };

        let mut hits: Vec<ScoredRecord> = vectors
            .iter()
            .enumerate()
            .map(|(index, vector)| ScoredRecord {
                index,
                score: cosine_similarity(&query_vector, vector),
            })
            .collect();

        hits.sort_by(|first, second| second.score.total_cmp(&first.score));
        hits.truncate(top_k);
        hits
    }
}
