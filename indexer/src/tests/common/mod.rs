use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rstest::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use url::Url;

use crate::core::client::rpc::RpcError;
use crate::error::IndexerError;
use crate::types::entity::ImportEntity;
use crate::types::import_state::{ImportData, ImportRanges, ProductImportData};
use crate::types::limitations::{RpcCallKind, RpcCallsPerEntity, RpcProvider};
use crate::types::query::Query;
use crate::types::range::Range;
use crate::worker::traits::{EntitySource, ErrorReport, ErrorSink, QueryFetcher};

/// A vault tracked by block ranges, created at `created_at_block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestVault {
    pub id: String,
    pub address: String,
    pub created_at_block: u64,
    pub live: bool,
}

impl TestVault {
    pub fn new(id: &str, created_at_block: u64) -> Self {
        Self { id: id.to_string(), address: format!("0x{}", id), created_at_block, live: true }
    }
}

impl ImportEntity for TestVault {
    fn import_key(&self) -> String {
        format!("product:investment:{}", self.id)
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn initial_import_data(&self, now: DateTime<Utc>) -> ImportData {
        ImportData::ProductInvestment(ProductImportData {
            product_id: self.id.clone(),
            chain: "bsc".to_string(),
            contract_address: self.address.clone(),
            contract_created_at_block: self.created_at_block,
            contract_created_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            ranges: ImportRanges::empty(now),
        })
    }
}

#[fixture]
pub fn vaults() -> Vec<TestVault> {
    vec![TestVault::new("a", 10), TestVault::new("b", 50), TestVault::new("c", 90)]
}

pub fn provider(host: &str, limitations_yaml: &str) -> RpcProvider {
    RpcProvider {
        url: Url::parse(&format!("https://{}/rpc", host)).unwrap(),
        limitations: serde_yaml::from_str(limitations_yaml).unwrap(),
    }
}

/// A provider taking concurrent, batched `eth_getLogs` calls.
#[fixture]
pub fn fast_provider() -> RpcProvider {
    provider(
        "fast.example.org",
        "min_delay_between_calls: no-limit\nmax_get_logs_block_span: 1000\nmethods:\n  eth_get_logs: 100\n",
    )
}

/// One logical call issued by [`FakeFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedQuery {
    pub provider: String,
    pub addresses: Vec<String>,
    pub range: Range<u64>,
}

/// Query fetcher answering from memory.
///
/// Queries touching one of `failing_addresses` fail unless the provider is an archive
/// node; `fail_batches` makes the next whole batches fail at the transport level.
#[derive(Default)]
pub struct FakeFetcher {
    pub latest_block_number: u64,
    pub failing_addresses: HashSet<String>,
    pub fail_batches: AtomicUsize,
    pub fetched: Mutex<Vec<FetchedQuery>>,
    pub latest_block_calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(latest_block_number: u64) -> Self {
        Self { latest_block_number, ..Default::default() }
    }

    pub fn failing_on(mut self, address: &str) -> Self {
        self.failing_addresses.insert(address.to_string());
        self
    }

    pub async fn fetched(&self) -> Vec<FetchedQuery> {
        self.fetched.lock().await.clone()
    }
}

#[async_trait]
impl<E: ImportEntity> QueryFetcher<E> for FakeFetcher {
    fn rpc_calls_per_entity(&self) -> RpcCallsPerEntity {
        RpcCallsPerEntity::new().with(RpcCallKind::EthGetLogs, 1)
    }

    async fn latest_block_number(&self, _provider: &RpcProvider) -> Result<u64, RpcError> {
        self.latest_block_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.latest_block_number)
    }

    async fn fetch(&self, provider: &RpcProvider, queries: &[Query<E, u64>]) -> Result<Vec<Result<(), RpcError>>, RpcError> {
        let failing_batch =
            self.fail_batches.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if failing_batch {
            return Err(RpcError::Transient { operation: "fetch".to_string(), message: "connection reset".to_string() });
        }

        let mut fetched = self.fetched.lock().await;
        Ok(queries
            .iter()
            .map(|query| {
                let addresses: Vec<String> = match query {
                    Query::AddressBatch(batch) => batch.objs.iter().map(|obj| obj.address().to_string()).collect(),
                    Query::SingleEntity(single) => vec![single.obj.address().to_string()],
                };
                let failed = !provider.limitations.is_archive_node
                    && addresses.iter().any(|address| self.failing_addresses.contains(address));
                fetched.push(FetchedQuery { provider: provider.lock_key(), addresses, range: query.range() });
                if failed {
                    Err(RpcError::ArchiveNodeNeeded { operation: "eth_getLogs".to_string(), message: "pruned".to_string() })
                } else {
                    Ok(())
                }
            })
            .collect())
    }
}

/// Error sink keeping every report.
#[derive(Default)]
pub struct CollectingErrorSink {
    pub reports: Mutex<Vec<ErrorReport>>,
}

#[async_trait]
impl<E: ImportEntity> ErrorSink<E> for CollectingErrorSink {
    async fn report(&self, _obj: &E, report: ErrorReport) {
        self.reports.lock().await.push(report);
    }
}

/// Entity source returning whatever was last set.
pub struct StaticEntitySource<E> {
    pub entities: Mutex<Vec<E>>,
    pub polls: AtomicUsize,
}

impl<E> StaticEntitySource<E> {
    pub fn new(entities: Vec<E>) -> Self {
        Self { entities: Mutex::new(entities), polls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl<E: ImportEntity> EntitySource<E> for StaticEntitySource<E> {
    async fn fetch_entities(&self) -> Result<Vec<E>, IndexerError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entities.lock().await.clone())
    }
}
