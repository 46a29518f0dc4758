use assert_matches::assert_matches;
use httpmock::prelude::*;
use rstest::*;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::connector::RawLogsFetcher;
use crate::core::client::rpc::{JsonRpcClient, RpcError};
use crate::tests::common::TestVault;
use crate::types::limitations::RpcProvider;
use crate::types::query::{Query, SingleEntityQuery};
use crate::types::range::Range;
use crate::worker::traits::QueryFetcher;

fn client(server: &MockServer) -> JsonRpcClient {
    JsonRpcClient::new(Url::parse(&server.url("/rpc")).unwrap()).with_timeout(Duration::from_secs(5))
}

fn single(vault: TestVault, from: u64, to: u64) -> Query<TestVault, u64> {
    Query::SingleEntity(SingleEntityQuery { obj: vault, range: Range::new(from, to) })
}

#[rstest]
#[tokio::test]
async fn block_number_is_decoded_from_hex() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc").body_contains("eth_blockNumber");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 1, "result": "0x1b4"}));
        })
        .await;

    assert_eq!(client(&server).block_number().await.unwrap(), 436);
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn batch_responses_are_matched_by_id() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc");
            then.status(200).json_body(json!([
                {"jsonrpc": "2.0", "id": 3, "result": "third"},
                {"jsonrpc": "2.0", "id": 1, "result": "first"},
                {"jsonrpc": "2.0", "id": 2, "error": {"code": -32000, "message": "header not found"}},
            ]));
        })
        .await;

    let calls = vec![("eth_call", json!([])), ("eth_call", json!([])), ("eth_call", json!([]))];
    let results = client(&server).batch_request(&calls).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap(), &json!("first"));
    assert_matches!(results[1], Err(RpcError::ArchiveNodeNeeded { .. }));
    assert_eq!(results[2].as_ref().unwrap(), &json!("third"));
}

#[rstest]
#[tokio::test]
async fn missing_batch_entries_are_invalid_responses() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc");
            then.status(200).json_body(json!([{"jsonrpc": "2.0", "id": 1, "result": "0x1"}]));
        })
        .await;

    let calls = vec![("eth_blockNumber", json!([])), ("eth_blockNumber", json!([]))];
    let results = client(&server).batch_request(&calls).await.unwrap();

    assert!(results[0].is_ok());
    assert_matches!(results[1], Err(RpcError::InvalidResponse { .. }));
}

#[rstest]
#[case(500, "internal error")]
#[case(429, "rate limit exceeded")]
#[tokio::test]
async fn http_errors_are_transient(#[case] status: u16, #[case] body: &str) {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc");
            then.status(status).body(body);
        })
        .await;

    let error = client(&server).block_number().await.unwrap_err();
    assert_matches!(error, RpcError::Transient { .. });
    assert!(error.is_retryable());
}

#[rstest]
#[tokio::test]
async fn pruned_state_needs_an_archive_node() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc").body_contains("eth_getLogs");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "missing trie node 5d1e (path )"}
            }));
        })
        .await;

    let error = client(&server).get_logs(&["0xa".to_string()], Range::new(1, 100)).await.unwrap_err();
    assert_matches!(error, RpcError::ArchiveNodeNeeded { .. });
    assert!(!error.is_retryable());
}

#[rstest]
#[tokio::test]
async fn get_logs_sends_hex_block_bounds() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rpc")
                .body_contains("\"fromBlock\":\"0xa\"")
                .body_contains("\"toBlock\":\"0xff\"")
                .body_contains("0xvault");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 1, "result": []}));
        })
        .await;

    let logs = client(&server).get_logs(&["0xvault".to_string()], Range::new(10, 255)).await.unwrap();
    assert!(logs.is_empty());
    mock.assert_async().await;
}

fn mock_provider(server: &MockServer) -> RpcProvider {
    RpcProvider {
        url: Url::parse(&server.url("/rpc")).unwrap(),
        limitations: serde_yaml::from_str("min_delay_between_calls: no-limit").unwrap(),
    }
}

#[rstest]
#[tokio::test]
async fn raw_logs_fetcher_reports_each_query() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc");
            then.status(200).json_body(json!([
                {"jsonrpc": "2.0", "id": 1, "result": [{"blockNumber": "0x5"}]},
                {"jsonrpc": "2.0", "id": 2, "error": {"code": -32005, "message": "query returned more than 10000 results"}},
            ]));
        })
        .await;
    let provider = mock_provider(&server);
    let fetcher = RawLogsFetcher::new(std::slice::from_ref(&provider), Duration::from_secs(5));

    let queries = vec![single(TestVault::new("a", 1), 1, 100), single(TestVault::new("b", 1), 1, 100)];
    let results = fetcher.fetch(&provider, &queries).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert_matches!(results[1], Err(RpcError::Transient { .. }));
}

#[rstest]
#[tokio::test]
async fn raw_logs_fetcher_single_query_skips_batching() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/rpc").body_contains("\"method\":\"eth_getLogs\"");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 1, "result": []}));
        })
        .await;
    let provider = mock_provider(&server);
    let fetcher = RawLogsFetcher::new(std::slice::from_ref(&provider), Duration::from_secs(5));

    let results = fetcher.fetch(&provider, &[single(TestVault::new("a", 1), 1, 100)]).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn raw_logs_fetcher_rejects_unknown_provider() {
    let fetcher = RawLogsFetcher::new(&[], Duration::from_secs(5));
    let provider = RpcProvider {
        url: Url::parse("https://unknown.example.org").unwrap(),
        limitations: serde_yaml::from_str("min_delay_between_calls: 100").unwrap(),
    };
    let result = QueryFetcher::<TestVault>::latest_block_number(&fetcher, &provider).await;
    assert_matches!(result, Err(RpcError::Configuration(_)));
}
