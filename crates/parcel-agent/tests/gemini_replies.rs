//! Stage errors for replies from the real provider, served by a local
//! HTTP stub.
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

use std::sync::Arc;
use std::time::Duration;

use mockito::{Mock, Server};
use parcel_agent::{AnalysisSynthesizer, QueryInterpreter, RetryPolicy};
use parcel_core::{AnalysisConfig, Dataset, Error, Intent, Parameters};
use parcel_providers::GeminiProvider;

const PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";
const EMPTY_REPLY: &str = r#"{"candidates":[{"content":{"parts":[{"text":""}]},"finishReason":"STOP"}]}"#;

async fn reply_with(server: &mut Server, body: &str) -> Mock {
    server
        .mock("POST", PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

fn provider_for(server: &Server) -> Arc<GeminiProvider> {
    Arc::new(
        GeminiProvider::new("test-key".to_owned())
            .unwrap()
            .with_base_url(server.url()),
    )
}

#[tokio::test]
async fn empty_reply_is_an_interpretation_error() {
    let mut server = Server::new_async().await;
    let _mock = reply_with(&mut server, EMPTY_REPLY).await;

    let interpreter = QueryInterpreter::new(provider_for(&server))
        .with_retry_policy(RetryPolicy::no_retry(Duration::from_secs(5)));
    let error = interpreter.interpret("Find 2BHK houses in London").await.unwrap_err();

    assert!(matches!(error, Error::Interpretation(_)), "{error}");
}

#[tokio::test]
async fn empty_reply_is_a_code_generation_error() {
    let mut server = Server::new_async().await;
    let _mock = reply_with(&mut server, EMPTY_REPLY).await;

    let dataset = Arc::new(Dataset::from_json_records(r#"[{"town": "Leeds"}]"#).unwrap());
    let synthesizer = AnalysisSynthesizer::new(provider_for(&server), dataset, AnalysisConfig::default())
        .with_retry_policy(RetryPolicy::no_retry(Duration::from_secs(5)));
    let error = synthesizer
        .generate("average price by town", &Parameters::new())
        .await
        .unwrap_err();

    assert!(matches!(error, Error::CodeGeneration(_)), "{error}");
}

#[tokio::test]
async fn fenced_reply_from_the_provider_is_interpreted() {
    let mut server = Server::new_async().await;
    let body = serde_json::json!({
        "candidates": [{
            "content": {"parts": [{"text": "```json\n{\"intent\": \"analysis\", \"parameters\": {}}\n```"}]},
            "finishReason": "STOP"
        }]
    });
    let _mock = reply_with(&mut server, &body.to_string()).await;

    let interpreter = QueryInterpreter::new(provider_for(&server));
    let interpretation = interpreter.interpret("Analyze prices over time").await.unwrap();

    assert_eq!(interpretation.intent, Intent::Analysis);
    assert!(interpretation.parameters.is_empty());
}
