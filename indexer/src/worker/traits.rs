//! Seams between the engine and the collaborators that know what an entity is.

use async_trait::async_trait;

use crate::core::client::rpc::RpcError;
use crate::error::IndexerError;
use crate::types::limitations::{RpcCallsPerEntity, RpcProvider};
use crate::types::query::Query;
use crate::types::range::Range;

/// Current list of entities to track, re-read on every input poll.
#[async_trait]
pub trait EntitySource<E>: Send + Sync {
    async fn fetch_entities(&self) -> Result<Vec<E>, IndexerError>;
}

/// Executes queries against one provider.
///
/// The engine never decodes results: it only needs to know, per query, whether
/// every entity it serves got its data.
#[async_trait]
pub trait QueryFetcher<E>: Send + Sync {
    /// RPC calls issued per input object, used to size batches.
    fn rpc_calls_per_entity(&self) -> RpcCallsPerEntity;

    async fn latest_block_number(&self, provider: &RpcProvider) -> Result<u64, RpcError>;

    /// One result per query, in the order of `queries`. An outer error fails them all.
    async fn fetch(&self, provider: &RpcProvider, queries: &[Query<E, u64>]) -> Result<Vec<Result<(), RpcError>>, RpcError>;
}

/// A range an entity could not get in this pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub import_key: String,
    pub range: Range<u64>,
    pub provider: String,
    pub error_type: &'static str,
    pub message: String,
}

/// Receives every entity whose batch ultimately failed.
#[async_trait]
pub trait ErrorSink<E>: Send + Sync {
    async fn report(&self, obj: &E, report: ErrorReport);
}
