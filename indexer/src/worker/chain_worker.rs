use chrono::Utc;
use futures::{future, stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::core::client::cache::get_or_compute;
use crate::core::client::rpc::RpcError;
use crate::core::config::Config;
use crate::error::{IndexerError, IndexerResult};
use crate::sync::batch::get_batch_config_from_limitations;
use crate::sync::index::{estimate_block_samples, BlobRangeIndex, BlockListRangeIndex, BlockSample, RangeIndexBuilder};
use crate::sync::normalizer::{import_state_to_optimizer_range_input, NormalizerContext};
use crate::sync::optimizer::{optimize_queries, OptimizerOptions};
use crate::types::entity::ImportEntity;
use crate::types::import_state::ImportState;
use crate::types::limitations::RpcProvider;
use crate::types::params::RangeIndexKind;
use crate::types::query::{OptimizerInput, Query, RangeOutcome};
use crate::worker::executor::RateLimitedExecutor;
use crate::worker::traits::{ErrorReport, ErrorSink, QueryFetcher};

/// Newest block successfully imported per import key, shared by the workers of a chain.
pub type LastImportedBlocks = Arc<Mutex<HashMap<String, u64>>>;

/// Import keys whose ranges a non-archive provider could not serve.
pub type ArchiveNeeded = Arc<Mutex<HashSet<String>>>;

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub entities: usize,
    pub queries: usize,
    pub batches: usize,
    pub covered_ranges: usize,
    pub failed_ranges: usize,
}

/// Imports the entities assigned to one provider.
pub struct ChainWorker<E: ImportEntity> {
    config: Arc<Config>,
    provider: RpcProvider,
    executor: Arc<RateLimitedExecutor>,
    fetcher: Arc<dyn QueryFetcher<E>>,
    error_sink: Arc<dyn ErrorSink<E>>,
    outcomes: mpsc::Sender<RangeOutcome<u64>>,
    last_imported: LastImportedBlocks,
    archive_needed: ArchiveNeeded,
}

#[derive(Clone)]
struct Failure {
    error_type: &'static str,
    message: String,
    archive_node_needed: bool,
}

impl From<&RpcError> for Failure {
    fn from(e: &RpcError) -> Self {
        Self {
            error_type: e.error_type(),
            message: e.to_string(),
            archive_node_needed: matches!(e, RpcError::ArchiveNodeNeeded { .. }),
        }
    }
}

impl<E: ImportEntity> ChainWorker<E> {
    pub fn new(
        config: Arc<Config>,
        provider: RpcProvider,
        executor: Arc<RateLimitedExecutor>,
        fetcher: Arc<dyn QueryFetcher<E>>,
        error_sink: Arc<dyn ErrorSink<E>>,
        outcomes: mpsc::Sender<RangeOutcome<u64>>,
        last_imported: LastImportedBlocks,
    ) -> Self {
        Self {
            config,
            provider,
            executor,
            fetcher,
            error_sink,
            outcomes,
            last_imported,
            archive_needed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Shares the set of entities to move to an archive provider.
    pub fn with_archive_needed(mut self, archive_needed: ArchiveNeeded) -> Self {
        self.archive_needed = archive_needed;
        self
    }

    /// Runs passes over `entities` until done or cancelled.
    ///
    /// Without `repeat_at_most_every` a single pass runs. Batches already sent when
    /// `cancel` fires are finished, no new batch starts.
    pub async fn run(self, entities: Vec<E>, cancel: CancellationToken) -> IndexerResult<()> {
        let span = info_span!("chain_worker", chain = %self.config.chain().chain, provider = %self.provider.lock_key());
        self.run_passes(entities, cancel).instrument(span).await
    }

    async fn run_passes(&self, entities: Vec<E>, cancel: CancellationToken) -> IndexerResult<()> {
        let repeat = self.config.behaviour().repeat_at_most_every;
        while !cancel.is_cancelled() {
            let started = Instant::now();
            match self.run_pass(&entities, &cancel).await {
                Ok(summary) => info!(
                    entities = summary.entities,
                    queries = summary.queries,
                    batches = summary.batches,
                    covered = summary.covered_ranges,
                    failed = summary.failed_ranges,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Pass completed"
                ),
                Err(IndexerError::ConfigError(e)) => {
                    error!(error = %e, "Configuration error, stopping worker");
                    return Err(e.into());
                }
                Err(e) if repeat.is_none() => return Err(e),
                Err(e) => error!(error = %e, "Pass failed"),
            }

            let Some(every) = repeat else {
                return Ok(());
            };
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(every.saturating_sub(started.elapsed())) => {}
            }
        }
        debug!("Worker stopped");
        Ok(())
    }

    /// One pass: normalize, optimize, batch and execute.
    pub async fn run_pass(&self, entities: &[E], cancel: &CancellationToken) -> IndexerResult<PassSummary> {
        if entities.is_empty() {
            return Ok(PassSummary::default());
        }
        let limitations = &self.provider.limitations;
        let options = OptimizerOptions::from_defaults(self.config.optimizer()).constrained_by(limitations);
        let batch_config = get_batch_config_from_limitations(
            &self.fetcher.rpc_calls_per_entity(),
            limitations,
            self.config.stream(),
            &self.provider.lock_key(),
        )?;

        let latest_block_number = self.latest_block_number().await?;
        let states = self.load_import_states(entities).await?;
        let inputs = self.normalize(entities, latest_block_number, options.max_range_size, &states).await;

        let index = self.range_index(&inputs, latest_block_number, &options);
        let queries = optimize_queries(&inputs, &options, index.as_ref());
        let query_count = queries.len();
        let batches = chunk_queries(queries, batch_config.max_input_objs_per_batch);
        debug!(
            latest_block_number,
            queries = query_count,
            batches = batches.len(),
            max_input_objs_per_batch = batch_config.max_input_objs_per_batch,
            work_concurrency = batch_config.work_concurrency,
            "Queries planned"
        );

        let mut summary =
            PassSummary { entities: entities.len(), queries: query_count, batches: batches.len(), ..Default::default() };
        let outcomes: Vec<Vec<RangeOutcome<u64>>> = stream::iter(batches)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|batch| self.execute_batch(batch))
            .buffer_unordered(batch_config.work_concurrency)
            .collect()
            .await;

        let mut last_imported = self.last_imported.lock().await;
        for outcome in outcomes.iter().flatten() {
            if outcome.success {
                summary.covered_ranges += 1;
                let newest = last_imported.entry(outcome.import_key.clone()).or_insert(outcome.range.to);
                *newest = (*newest).max(outcome.range.to);
            } else {
                summary.failed_ranges += 1;
            }
        }
        Ok(summary)
    }

    /// Index strategy for this pass; the block grid follows the current tip.
    fn range_index(
        &self,
        inputs: &[OptimizerInput<E, u64>],
        latest_block_number: u64,
        options: &OptimizerOptions,
    ) -> Box<dyn RangeIndexBuilder<u64>> {
        let defaults = self.config.optimizer();
        match defaults.range_index {
            RangeIndexKind::Blob => Box::new(BlobRangeIndex {
                merge_if_closer_than: defaults.merge_if_closer_than,
                vertical_slices_size: defaults.vertical_slices_size.min(options.max_range_size),
            }),
            RangeIndexKind::BlockList => {
                let ms_per_block_estimate = self.config.chain().ms_per_block_estimate;
                let first_block = inputs
                    .iter()
                    .filter(|input| input.full_range.is_valid())
                    .map(|input| input.full_range.from)
                    .min()
                    .unwrap_or(latest_block_number);
                let tip = BlockSample { number: latest_block_number, datetime: Utc::now() };
                Box::new(BlockListRangeIndex {
                    samples: estimate_block_samples(
                        first_block,
                        tip,
                        ms_per_block_estimate,
                        defaults.block_sampling_interval,
                    ),
                    latest_block_number,
                    sampling_interval: defaults.block_sampling_interval,
                    ms_per_block_estimate,
                    max_blocks_per_query: options.max_range_size,
                    mode: self.config.behaviour().mode,
                })
            }
        }
    }

    /// Chain tip, shared through the cache by every worker of the chain.
    async fn latest_block_number(&self) -> IndexerResult<u64> {
        let chain = self.config.chain();
        let key = format!("latest_block:{}", chain.chain);
        let cache = self.config.cache();
        let latest = get_or_compute(cache.as_ref(), &key, chain.latest_block_cache_ttl, || async {
            let latest = self
                .executor
                .execute(&self.provider, "eth_blockNumber", || self.fetcher.latest_block_number(&self.provider))
                .await?;
            Ok::<_, IndexerError>(Some(latest))
        })
        .await?;
        latest.ok_or_else(|| IndexerError::WorkerError(format!("no latest block number for {}", chain.chain)))
    }

    /// Stored import states by key, creating the missing ones.
    async fn load_import_states(&self, entities: &[E]) -> IndexerResult<HashMap<String, ImportState>> {
        let store = self.config.import_states();
        let keys: Vec<String> = entities.iter().map(ImportEntity::import_key).collect();
        let mut states: HashMap<String, ImportState> =
            store.get_import_states(&keys).await?.into_iter().map(|state| (state.import_key.clone(), state)).collect();

        let now = Utc::now();
        for entity in entities {
            let import_key = entity.import_key();
            if states.contains_key(&import_key) {
                continue;
            }
            let initial = ImportState::new(import_key.clone(), entity.initial_import_data(now));
            let state = store.create_import_state_if_missing(initial).await?;
            debug!(import_key = %import_key, kind = state.import_data.kind(), "Import state created");
            states.insert(import_key, state);
        }
        Ok(states)
    }

    async fn normalize(
        &self,
        entities: &[E],
        latest_block_number: u64,
        max_blocks_per_query: u64,
        states: &HashMap<String, ImportState>,
    ) -> Vec<OptimizerInput<E, u64>> {
        let ctx = NormalizerContext {
            behaviour: self.config.behaviour(),
            latest_block_number,
            max_blocks_per_query,
            ms_per_block_estimate: self.config.chain().ms_per_block_estimate,
        };
        let last_imported = self.last_imported.lock().await;
        entities
            .iter()
            .filter_map(|entity| {
                let import_key = entity.import_key();
                let last = last_imported.get(&import_key).copied();
                match import_state_to_optimizer_range_input(entity.clone(), &ctx, last, states.get(&import_key)) {
                    Ok(input) => Some(input),
                    Err(e) => {
                        error!(import_key = %import_key, error = %e, "Skipping entity");
                        None
                    }
                }
            })
            .collect()
    }

    /// Runs one batch and forwards an outcome per entity range to the updater.
    async fn execute_batch(&self, batch: Vec<Query<E, u64>>) -> Vec<RangeOutcome<u64>> {
        let queries = batch.as_slice();
        let result = self.executor.execute(&self.provider, "fetch", || self.fetcher.fetch(&self.provider, queries)).await;
        let failures: Vec<Option<Failure>> = match result {
            Ok(results) if results.len() == batch.len() => {
                results.iter().map(|result| result.as_ref().err().map(Failure::from)).collect()
            }
            Ok(results) => {
                let e = RpcError::InvalidResponse {
                    operation: "fetch".to_string(),
                    message: format!("{} results for {} queries", results.len(), batch.len()),
                };
                vec![Some(Failure::from(&e)); batch.len()]
            }
            Err(e) => vec![Some(Failure::from(&e)); batch.len()],
        };

        let mut outcomes = Vec::new();
        for (query, failure) in batch.iter().zip(failures) {
            for (obj, ranges) in query.entity_ranges() {
                let import_key = obj.import_key();
                if failure.as_ref().is_some_and(|failure| failure.archive_node_needed)
                    && !self.provider.limitations.is_archive_node
                    && self.archive_needed.lock().await.insert(import_key.clone())
                {
                    warn!(import_key = %import_key, "Pruned state, moving entity to an archive provider");
                }
                for range in ranges {
                    let outcome = match &failure {
                        None => RangeOutcome::success(import_key.clone(), range),
                        Some(failure) => {
                            let report = ErrorReport {
                                import_key: import_key.clone(),
                                range,
                                provider: self.provider.lock_key(),
                                error_type: failure.error_type,
                                message: failure.message.clone(),
                            };
                            self.error_sink.report(obj, report).await;
                            RangeOutcome::failure(import_key.clone(), range)
                        }
                    };
                    if self.outcomes.send(outcome.clone()).await.is_err() {
                        warn!(import_key = %import_key, "Import state updater stopped, outcome dropped");
                    }
                    outcomes.push(outcome);
                }
            }
        }
        outcomes
    }
}

/// Groups queries so a batch stays under `max_objs` input objects.
///
/// An address batch larger than `max_objs` goes alone in its own batch.
pub fn chunk_queries<E>(queries: Vec<Query<E, u64>>, max_objs: usize) -> Vec<Vec<Query<E, u64>>> {
    let mut batches = Vec::new();
    let mut current: Vec<Query<E, u64>> = Vec::new();
    let mut current_objs = 0usize;
    for query in queries {
        let objs = query.obj_count();
        if !current.is_empty() && current_objs + objs > max_objs {
            batches.push(std::mem::take(&mut current));
            current_objs = 0;
        }
        current_objs += objs;
        current.push(query);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
