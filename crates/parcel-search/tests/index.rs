//! Index build and search behaviour against a small property dataset.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::tests_outside_test_module,
        reason = "Allow for tests"
    )
)]

use parcel_core::{Dataset, Error, ParamValue, Parameters, Result};
use parcel_search::{EmbeddingIndex, EmbeddingProvider, HashingEmbedder};

const RECORDS: &str = r#"[
    {"address": "1 Park Row", "postcode": "LS1 5AB", "district": "Leeds", "sector": "LS1", "town": "Leeds", "region": "Yorkshire", "bedrooms": 2},
    {"address": "5 Mill Lane", "postcode": "BS1 4DJ", "district": "Bristol", "sector": "BS1", "town": "Bristol", "region": "South West", "bedrooms": 3},
    {"address": "9 Quay Street", "postcode": "M3 3JE", "district": "Manchester", "sector": "M3", "town": "Manchester", "region": "North West", "bedrooms": 1},
    {"address": "22 Kirkgate", "postcode": "LS2 7DJ", "district": "Leeds", "sector": "LS2", "town": "Leeds", "region": "Yorkshire", "bedrooms": 2}
]"#;

fn dataset() -> Dataset {
    Dataset::from_json_records(RECORDS).unwrap()
}

fn text_columns() -> Vec<String> {
    ["address", "postcode", "district", "sector", "town", "region"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Embedder whose service is down.
struct UnreachableEmbedder;

impl EmbeddingProvider for UnreachableEmbedder {
    async fn ensure_model_available(&self) -> Result<()> {
        Err(Error::EmbeddingBuild("connection refused".to_owned()))
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingBuild("connection refused".to_owned()))
    }

    async fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Err(Error::EmbeddingBuild("connection refused".to_owned()))
    }
}

/// Embedder that drops the last vector of a batch.
struct ShortBatchEmbedder;

impl EmbeddingProvider for ShortBatchEmbedder {
    async fn ensure_model_available(&self) -> Result<()> {
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(HashingEmbedder::default().vector(text))
    }

    async fn embed_batch(&self, mut texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        texts.pop();
        Ok(texts.iter().map(|text| HashingEmbedder::default().vector(text)).collect())
    }
}

/// Embedder that builds fine but cannot encode queries.
struct QueryFailingEmbedder;

impl EmbeddingProvider for QueryFailingEmbedder {
    async fn ensure_model_available(&self) -> Result<()> {
        Ok(())
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingBuild("model unloaded".to_owned()))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| HashingEmbedder::default().vector(text)).collect())
    }
}

#[tokio::test]
async fn ranks_matching_town_first() {
    let index = EmbeddingIndex::build(&dataset(), HashingEmbedder::default(), &text_columns()).await;
    assert!(index.is_available());
    assert_eq!(index.len(), 4);

    let mut parameters = Parameters::new();
    parameters.insert("town".to_owned(), ParamValue::Text("Leeds".to_owned()));

    let hits = index.search("2BHK flat in Leeds", &parameters, 5).await;
    assert_eq!(hits.len(), 4);
    let top_two: Vec<usize> = hits.iter().take(2).copied().collect();
    assert!(top_two.contains(&0));
    assert!(top_two.contains(&3));
}

#[tokio::test]
async fn respects_top_k_and_orders_by_score() {
    let index = EmbeddingIndex::build(&dataset(), HashingEmbedder::default(), &text_columns()).await;

    let scored = index
        .search_scored("Bristol South West", &Parameters::new(), 2)
        .await;
    assert_eq!(scored.len(), 2);
    assert_eq!(scored[0].index, 1);
    assert!(scored[0].score >= scored[1].score);

    assert!(index.search("Bristol", &Parameters::new(), 0).await.is_empty());
}

#[tokio::test]
async fn ties_keep_record_order() {
    let index = EmbeddingIndex::build(&dataset(), HashingEmbedder::default(), &text_columns()).await;

    // A blank search string embeds to the zero vector, so every score is zero.
    let hits = index.search("", &Parameters::new(), 3).await;
    assert_eq!(hits, vec![0, 1, 2]);
}

#[tokio::test]
async fn unreachable_embedder_leaves_index_unavailable() {
    let index = EmbeddingIndex::build(&dataset(), UnreachableEmbedder, &text_columns()).await;
    assert!(!index.is_available());
    assert!(index.is_empty());
    assert!(index.search("Leeds", &Parameters::new(), 5).await.is_empty());
}

#[tokio::test]
async fn vector_count_mismatch_leaves_index_unavailable() {
    let index = EmbeddingIndex::build(&dataset(), ShortBatchEmbedder, &text_columns()).await;
    assert!(!index.is_available());
    assert!(index.search("Leeds", &Parameters::new(), 5).await.is_empty());
}

#[tokio::test]
async fn query_encoding_failure_returns_nothing() {
    let index = EmbeddingIndex::build(&dataset(), QueryFailingEmbedder, &text_columns()).await;
    assert!(index.is_available());
    assert!(index.search("Leeds", &Parameters::new(), 5).await.is_empty());
}
