//! Sampling Gating Test
//!
//! Tests that completion requests only reach the peer once it has advertised
//! the sampling capability

use serde_json::json;

mod helpers;
use helpers::{engine_with_stub, initialize_request, tool_call};

#[tokio::test]
async fn test_sampling_before_handshake_fails_fast() {
    let (engine, peer) = engine_with_stub("gating").await;

    let response = engine
        .handle_message(tool_call(1, "summarize", json!({"text": "long story"})))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], -32003);
    let message = response["error"]["message"].as_str().unwrap();
    assert!(message.contains("handshake"));
    assert_eq!(peer.request_calls(), 0);
}

#[tokio::test]
async fn test_sampling_without_advertised_capability() {
    let (engine, peer) = engine_with_stub("gating").await;

    engine
        .handle_message(initialize_request(1, json!({"roots": {"listChanged": true}})))
        .await
        .unwrap();

    let response = engine
        .handle_message(tool_call(2, "summarize", json!({"text": "long story"})))
        .await
        .unwrap();

    assert_eq!(response["error"]["code"], -32003);
    assert!(response["error"]["message"]
        .as_str()
        .unwrap()
        .contains("roots"));
    assert_eq!(peer.request_calls(), 0);
}

#[tokio::test]
async fn test_sampling_after_capability_advertised() {
    let (engine, peer) = engine_with_stub("gating").await;

    engine
        .handle_message(initialize_request(1, json!({"sampling": {}})))
        .await
        .unwrap();

    let response = engine
        .handle_message(tool_call(2, "summarize", json!({"text": "long story"})))
        .await
        .unwrap();

    assert_eq!(response["result"]["isError"], false);
    assert_eq!(response["result"]["structuredContent"]["summary"], "stubbed");
    assert_eq!(peer.request_calls(), 1);
}

#[tokio::test]
async fn test_reinitialize_without_sampling_revokes_it() {
    let (engine, peer) = engine_with_stub("gating").await;

    engine
        .handle_message(initialize_request(1, json!({"sampling": {}})))
        .await
        .unwrap();
    engine
        .handle_message(initialize_request(2, json!({})))
        .await
        .unwrap();

    let response = engine
        .handle_message(tool_call(3, "summarize", json!({"text": "x"})))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], -32003);
    assert_eq!(peer.request_calls(), 0);
}
