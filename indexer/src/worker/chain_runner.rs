use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::core::config::Config;
use crate::error::{IndexerError, IndexerResult};
use crate::sync::updater::ImportStateUpdater;
use crate::types::entity::ImportEntity;
use crate::worker::chain_worker::{ArchiveNeeded, ChainWorker, LastImportedBlocks};
use crate::worker::executor::RateLimitedExecutor;
use crate::worker::traits::{EntitySource, ErrorSink, QueryFetcher};
use crate::worker::weights::{provider_weight, weighted_split, WeightedBranches};

struct RunningWorker {
    import_keys: Vec<String>,
    cancel: CancellationToken,
    handle: JoinHandle<IndexerResult<()>>,
}

impl RunningWorker {
    /// Requests a stop and waits for in-flight batches to finish.
    async fn stop(self) -> IndexerResult<()> {
        self.cancel.cancel();
        self.handle.await.map_err(|e| IndexerError::WorkerError(format!("worker task failed: {}", e)))?
    }
}

/// Spreads the entities of one chain across its providers and keeps them imported.
///
/// Every `input_poll_interval` the entity list is read again and split by provider
/// weight. A worker whose assignment changed is stopped and started again with the
/// new list; a worker that finished its passes is started again too. Entities a
/// pruned node could not serve are only given to archive providers from then on.
pub struct ChainRunner<E: ImportEntity> {
    config: Arc<Config>,
    source: Arc<dyn EntitySource<E>>,
    fetcher: Arc<dyn QueryFetcher<E>>,
    error_sink: Arc<dyn ErrorSink<E>>,
}

impl<E: ImportEntity> ChainRunner<E> {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn EntitySource<E>>,
        fetcher: Arc<dyn QueryFetcher<E>>,
        error_sink: Arc<dyn ErrorSink<E>>,
    ) -> Self {
        Self { config, source, fetcher, error_sink }
    }

    /// Runs until `shutdown` is cancelled or a worker fails on a configuration error.
    ///
    /// Outcomes already produced are written before this returns.
    pub async fn run(self, shutdown: CancellationToken) -> IndexerResult<()> {
        let span = info_span!("chain_runner", chain = %self.config.chain().chain);
        self.run_inner(shutdown).instrument(span).await
    }

    async fn run_inner(self, shutdown: CancellationToken) -> IndexerResult<()> {
        let providers = self.config.providers();
        let branches = WeightedBranches::from_weights(
            providers.iter().enumerate().map(|(index, provider)| (index, provider_weight(&provider.limitations))).collect(),
        )?;
        let archive_weights: Vec<(usize, u64)> = providers
            .iter()
            .enumerate()
            .filter(|(_, provider)| provider.limitations.is_archive_node)
            .map(|(index, provider)| (index, provider_weight(&provider.limitations)))
            .collect();
        let archive_branches =
            if archive_weights.is_empty() { None } else { Some(WeightedBranches::from_weights(archive_weights)?) };
        if archive_branches.is_none() {
            info!("No archive provider configured, pruned state stays in to_retry");
        }
        let archive_needed: ArchiveNeeded = Arc::new(Mutex::new(HashSet::new()));

        let stream = self.config.stream();
        let (outcomes_tx, outcomes_rx) = mpsc::channel(stream.updater_max_buffer.max(1) * 2);
        let updater = ImportStateUpdater::new(
            self.config.import_states(),
            stream.updater_max_buffer,
            Duration::from_millis(stream.updater_max_wait_ms),
        );
        let updater_handle = tokio::spawn(updater.run::<u64>(outcomes_rx).in_current_span());

        let executor = Arc::new(RateLimitedExecutor::new(
            self.config.locks(),
            self.config.retry().clone(),
            self.config.lock_params().clone(),
        ));
        let last_imported: LastImportedBlocks = Arc::new(Mutex::new(HashMap::new()));
        let mut workers: Vec<Option<RunningWorker>> = providers.iter().map(|_| None).collect();

        let mut poll = tokio::time::interval(self.config.behaviour().input_poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result: IndexerResult<()> = 'polling: loop {
            tokio::select! {
                _ = shutdown.cancelled() => break 'polling Ok(()),
                _ = poll.tick() => {}
            }

            let entities: Vec<E> = match self.source.fetch_entities().await {
                Ok(entities) => entities
                    .into_iter()
                    .sorted_by_key(ImportEntity::import_key)
                    .dedup_by(|a, b| a.import_key() == b.import_key())
                    .collect(),
                Err(e) => {
                    error!(error = %e, "Failed to fetch entities, keeping current assignment");
                    continue;
                }
            };
            debug!(entities = entities.len(), "Entities polled");

            let assignments = match &archive_branches {
                Some(archive_branches) => {
                    let needed = archive_needed.lock().await;
                    let (archive_bound, rest): (Vec<E>, Vec<E>) =
                        entities.into_iter().partition(|entity| needed.contains(&entity.import_key()));
                    drop(needed);
                    let mut assignments = weighted_split(&branches, rest);
                    for (index, assigned) in weighted_split(archive_branches, archive_bound) {
                        assignments[index].1.extend(assigned);
                    }
                    assignments
                }
                None => weighted_split(&branches, entities),
            };

            for (index, assigned) in assignments {
                let import_keys: Vec<String> = assigned.iter().map(ImportEntity::import_key).collect();
                if let Some(running) = &workers[index] {
                    if running.import_keys == import_keys && !running.handle.is_finished() {
                        continue;
                    }
                }
                if let Some(running) = workers[index].take() {
                    if let Err(e) = running.stop().await {
                        error!(provider = %providers[index].lock_key(), error = %e, "Worker failed");
                        if matches!(e, IndexerError::ConfigError(_)) {
                            break 'polling Err(e);
                        }
                    }
                }
                if assigned.is_empty() {
                    continue;
                }

                info!(provider = %providers[index].lock_key(), entities = assigned.len(), "Starting worker");
                let worker = ChainWorker::new(
                    self.config.clone(),
                    providers[index].clone(),
                    executor.clone(),
                    self.fetcher.clone(),
                    self.error_sink.clone(),
                    outcomes_tx.clone(),
                    last_imported.clone(),
                )
                .with_archive_needed(archive_needed.clone());
                let cancel = shutdown.child_token();
                let handle = tokio::spawn(worker.run(assigned, cancel.clone()));
                workers[index] = Some(RunningWorker { import_keys, cancel, handle });
            }
        };

        for running in workers.into_iter().flatten() {
            if let Err(e) = running.stop().await {
                error!(error = %e, "Worker failed while stopping");
            }
        }
        drop(outcomes_tx);
        if let Err(e) = updater_handle.await {
            error!(error = %e, "Import state updater task failed");
        }
        info!("Chain runner stopped");
        result
    }
}
