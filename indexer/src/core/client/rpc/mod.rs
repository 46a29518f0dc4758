pub mod error;

pub use error::RpcError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;
use url::Url;

use crate::types::range::Range;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn into_result(self, method: &str) -> Result<Value, RpcError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(RpcError::from_provider_message(method, format!("{} ({})", error.message, error.code))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcError::InvalidResponse {
                operation: method.to_string(),
                message: "response has neither result nor error".to_string(),
            }),
        }
    }
}

/// Minimal JSON-RPC 2.0 client over HTTP, with support for batched requests.
///
/// It does not pace or retry calls; that is the executor's job.
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: Url,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: Url) -> Self {
        Self { http: reqwest::Client::new(), url, timeout: DEFAULT_REQUEST_TIMEOUT, next_id: AtomicU64::new(1) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post<B: Serialize + ?Sized>(&self, operation: &str, body: &B) -> Result<Value, RpcError> {
        let response = self
            .http
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::from_provider_message(operation, format!("HTTP {}: {}", status, body)));
        }
        response.json::<Value>().await.map_err(|e| RpcError::from_reqwest_error(operation, e))
    }

    /// Single call, decoded into `R`
    pub async fn request<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(method, id, "Sending JSON-RPC request");
        let body = JsonRpcRequest { jsonrpc: "2.0", id, method, params: &params };
        let raw = self.post(method, &body).await?;
        let response: JsonRpcResponse = serde_json::from_value(raw)
            .map_err(|e| RpcError::InvalidResponse { operation: method.to_string(), message: e.to_string() })?;
        let result = response.into_result(method)?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse { operation: method.to_string(), message: e.to_string() })
    }

    /// Several calls in one HTTP round trip.
    ///
    /// The outer error covers the transport; each call then carries its own result,
    /// returned in the order of `calls` whatever order the provider answered in.
    pub async fn batch_request(&self, calls: &[(&str, Value)]) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let first_id = self.next_id.fetch_add(calls.len() as u64, Ordering::Relaxed);
        let body: Vec<JsonRpcRequest<'_>> = calls
            .iter()
            .enumerate()
            .map(|(i, (method, params))| JsonRpcRequest { jsonrpc: "2.0", id: first_id + i as u64, method: *method, params })
            .collect();
        trace!(size = calls.len(), "Sending JSON-RPC batch");

        let raw = self.post("batch", &body).await?;
        let responses: Vec<JsonRpcResponse> = serde_json::from_value(raw)
            .map_err(|e| RpcError::InvalidResponse { operation: "batch".to_string(), message: e.to_string() })?;
        let mut by_id: HashMap<u64, JsonRpcResponse> =
            responses.into_iter().filter_map(|response| response.id.as_u64().map(|id| (id, response))).collect();

        Ok(calls
            .iter()
            .enumerate()
            .map(|(i, (method, _))| match by_id.remove(&(first_id + i as u64)) {
                Some(response) => response.into_result(method),
                None => Err(RpcError::InvalidResponse {
                    operation: method.to_string(),
                    message: "missing from batch response".to_string(),
                }),
            })
            .collect())
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let hex: String = self.request("eth_blockNumber", Value::Array(vec![])).await?;
        parse_quantity("eth_blockNumber", &hex)
    }

    /// `eth_getLogs` for many addresses over one inclusive block range
    pub async fn get_logs(&self, addresses: &[String], range: Range<u64>) -> Result<Vec<Value>, RpcError> {
        self.request("eth_getLogs", get_logs_params(addresses, range)).await
    }
}

pub fn get_logs_params(addresses: &[String], range: Range<u64>) -> Value {
    serde_json::json!([{
        "address": addresses,
        "fromBlock": format!("{:#x}", range.from),
        "toBlock": format!("{:#x}", range.to),
    }])
}

/// Parses an hex encoded JSON-RPC quantity such as `0x1b4`.
pub fn parse_quantity(operation: &str, value: &str) -> Result<u64, RpcError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::InvalidResponse {
        operation: operation.to_string(),
        message: format!("invalid quantity {}: {}", value, e),
    })
}
