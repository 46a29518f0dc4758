use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

use crate::core::client::rpc::{get_logs_params, JsonRpcClient, RpcError};
use crate::error::ConfigError;
use crate::types::entity::ImportEntity;
use crate::types::limitations::{RpcCallKind, RpcCallsPerEntity, RpcProvider};
use crate::types::query::Query;
use crate::worker::traits::QueryFetcher;

/// Fetches raw `eth_getLogs` results for every query.
///
/// One call per query: address batches list every member address, single-entity
/// queries only their own. Queries of one batch share a JSON-RPC batch request.
pub struct RawLogsFetcher {
    clients: HashMap<String, JsonRpcClient>,
}

impl RawLogsFetcher {
    pub fn new(providers: &[RpcProvider], timeout: Duration) -> Self {
        let clients = providers
            .iter()
            .map(|provider| (provider.url.to_string(), JsonRpcClient::new(provider.url.clone()).with_timeout(timeout)))
            .collect();
        Self { clients }
    }

    fn client(&self, provider: &RpcProvider) -> Result<&JsonRpcClient, RpcError> {
        self.clients.get(provider.url.as_str()).ok_or_else(|| {
            RpcError::Configuration(ConfigError::InvalidProvidersFile(format!("no client for {}", provider.lock_key())))
        })
    }
}

fn query_addresses<E: ImportEntity>(query: &Query<E, u64>) -> Vec<String> {
    match query {
        Query::AddressBatch(batch) => batch.objs.iter().map(|obj| obj.address().to_string()).collect(),
        Query::SingleEntity(single) => vec![single.obj.address().to_string()],
    }
}

fn count_logs(value: &Value) -> usize {
    value.as_array().map_or(0, Vec::len)
}

#[async_trait]
impl<E: ImportEntity> QueryFetcher<E> for RawLogsFetcher {
    fn rpc_calls_per_entity(&self) -> RpcCallsPerEntity {
        RpcCallsPerEntity::new().with(RpcCallKind::EthGetLogs, 1)
    }

    async fn latest_block_number(&self, provider: &RpcProvider) -> Result<u64, RpcError> {
        self.client(provider)?.block_number().await
    }

    async fn fetch(&self, provider: &RpcProvider, queries: &[Query<E, u64>]) -> Result<Vec<Result<(), RpcError>>, RpcError> {
        let client = self.client(provider)?;
        let params: Vec<Value> = queries.iter().map(|query| get_logs_params(&query_addresses(query), query.range())).collect();

        if let [single] = params.as_slice() {
            let logs: Value = client.request("eth_getLogs", single.clone()).await?;
            trace!(logs = count_logs(&logs), "Logs fetched");
            return Ok(vec![Ok(())]);
        }

        let calls: Vec<(&str, Value)> = params.into_iter().map(|params| ("eth_getLogs", params)).collect();
        let results = client.batch_request(&calls).await?;
        Ok(results
            .into_iter()
            .map(|result| {
                let logs = result?;
                trace!(logs = count_logs(&logs), "Logs fetched");
                Ok(())
            })
            .collect())
    }
}
