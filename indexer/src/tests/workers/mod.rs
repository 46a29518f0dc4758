use assert_matches::assert_matches;
use chrono::{DateTime, Utc};
use rstest::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::client::rpc::RpcError;
use crate::core::client::InMemoryLockClient;
use crate::core::config::Config;
use crate::error::IndexerError;
use crate::sync::updater::ImportStateUpdater;
use crate::tests::common::{
    fast_provider, provider, vaults, CollectingErrorSink, FakeFetcher, StaticEntitySource, TestVault,
};
use crate::tests::config::TestConfigBuilder;
use crate::types::entity::ImportEntity;
use crate::types::import_state::ImportRanges;
use crate::types::limitations::RpcProvider;
use crate::types::params::{LockParams, RangeIndexKind, RetryConfig, SkipRecentWindow};
use crate::types::range::Range;
use crate::worker::chain_worker::LastImportedBlocks;
use crate::worker::{ChainRunner, ChainWorker, RateLimitedExecutor};

/// Provider refusing address batches, so every query serves a single vault.
#[fixture]
fn single_address_provider() -> RpcProvider {
    provider(
        "single.example.org",
        "min_delay_between_calls: no-limit\n\
         max_get_logs_block_span: 1000\n\
         max_get_logs_address_batch_size: 1\n\
         methods:\n  eth_get_logs: 100\n",
    )
}

async fn ranges_of(config: &Config, vault: &TestVault) -> Option<ImportRanges<u64>> {
    let state = config.import_states().get_import_state(&vault.import_key()).await.unwrap()?;
    state.ranges::<u64>().cloned()
}

/// Runs one worker over `vaults` to completion and waits for every outcome to be persisted.
async fn run_worker(
    config: Arc<Config>,
    provider: RpcProvider,
    fetcher: Arc<FakeFetcher>,
    sink: Arc<CollectingErrorSink>,
    vaults: Vec<TestVault>,
) -> (Result<(), IndexerError>, LastImportedBlocks) {
    let (tx, rx) = mpsc::channel(64);
    let updater = tokio::spawn(ImportStateUpdater::new(config.import_states(), 10, Duration::from_millis(50)).run::<u64>(rx));
    let executor = Arc::new(RateLimitedExecutor::new(config.locks(), config.retry().clone(), config.lock_params().clone()));
    let last_imported: LastImportedBlocks = Arc::new(Mutex::new(HashMap::new()));

    let worker: ChainWorker<TestVault> =
        ChainWorker::new(config, provider, executor, fetcher, sink, tx, last_imported.clone());
    let result = worker.run(vaults, CancellationToken::new()).await;
    updater.await.unwrap();
    (result, last_imported)
}

#[rstest]
#[tokio::test]
async fn executors_sharing_a_lock_backend_space_their_calls() {
    let locks = Arc::new(InMemoryLockClient::new());
    let spaced = provider("spaced.example.org", "min_delay_between_calls: 100\nmethods:\n  eth_get_logs: 10\n");
    let retry = RetryConfig { max_attempts: 1, base_delay_ms: 10, max_delay_ms: 10 };
    let lock_params = LockParams { acquire_timeout_ms: 5_000, expiry_seconds: 10 };
    let calls: Arc<Mutex<Vec<DateTime<Utc>>>> = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let executor = RateLimitedExecutor::new(locks.clone(), retry.clone(), lock_params.clone());
            let spaced = spaced.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                for _ in 0..3 {
                    executor
                        .execute(&spaced, "eth_getLogs", || async {
                            calls.lock().await.push(Utc::now());
                            Ok::<_, RpcError>(())
                        })
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let mut calls = calls.lock().await.clone();
    calls.sort();
    assert_eq!(calls.len(), 6);
    for pair in calls.windows(2) {
        let gap = (pair[1] - pair[0]).num_milliseconds();
        assert!(gap >= 90, "calls only {}ms apart", gap);
    }
}

#[rstest]
#[tokio::test]
async fn worker_covers_history_and_reports_failures(
    vaults: Vec<TestVault>,
    single_address_provider: RpcProvider,
) {
    let config = TestConfigBuilder::new()
        .providers(vec![single_address_provider.clone()])
        .historical()
        .skip_recent_window(SkipRecentWindow::None)
        .build();
    let fetcher = Arc::new(FakeFetcher::new(5_000).failing_on("0xc"));
    let sink = Arc::new(CollectingErrorSink::default());

    let (result, last_imported) =
        run_worker(config.clone(), single_address_provider, fetcher.clone(), sink.clone(), vaults.clone()).await;
    assert!(result.is_ok());

    let a = ranges_of(&config, &vaults[0]).await.unwrap();
    assert_eq!(a.covered_ranges, vec![Range::new(10, 5_000)]);
    assert!(a.to_retry.is_empty());
    let b = ranges_of(&config, &vaults[1]).await.unwrap();
    assert_eq!(b.covered_ranges, vec![Range::new(50, 5_000)]);
    let c = ranges_of(&config, &vaults[2]).await.unwrap();
    assert!(c.covered_ranges.is_empty());
    assert_eq!(c.to_retry, vec![Range::new(90, 5_000)]);

    let reports = sink.reports.lock().await;
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|report| report.import_key == "product:investment:c"));
    assert!(reports.iter().all(|report| report.error_type == "archive_node_needed"));

    let fetched = fetcher.fetched().await;
    assert!(fetched.iter().all(|query| query.addresses.len() == 1 && query.range.len() <= 1_000));
    assert_eq!(last_imported.lock().await.get("product:investment:a"), Some(&5_000));
}

#[rstest]
#[tokio::test]
async fn forced_range_bounds_the_pass(vaults: Vec<TestVault>, single_address_provider: RpcProvider) {
    let config = TestConfigBuilder::new()
        .providers(vec![single_address_provider.clone()])
        .historical()
        .skip_recent_window(SkipRecentWindow::None)
        .forced_range(1_000, 2_500)
        .build();
    let fetcher = Arc::new(FakeFetcher::new(5_000));

    let sink = Arc::new(CollectingErrorSink::default());

    let (result, _) = run_worker(config.clone(), single_address_provider, fetcher.clone(), sink, vaults.clone()).await;
    assert!(result.is_ok());

    for vault in &vaults {
        assert_eq!(ranges_of(&config, vault).await.unwrap().covered_ranges, vec![Range::new(1_000, 2_500)]);
    }
    assert!(fetcher.fetched().await.iter().all(|query| query.range.from >= 1_000 && query.range.to <= 2_500));
}

#[rstest]
#[tokio::test]
async fn repeating_worker_keeps_retrying_failed_entities(vaults: Vec<TestVault>, single_address_provider: RpcProvider) {
    let config = TestConfigBuilder::new()
        .providers(vec![single_address_provider.clone()])
        .repeat_every(Duration::from_millis(20))
        .build();
    let fetcher = Arc::new(FakeFetcher::new(5_000).failing_on("0xc"));
    let (tx, mut rx) = mpsc::channel(1_024);
    let executor = Arc::new(RateLimitedExecutor::new(config.locks(), config.retry().clone(), config.lock_params().clone()));
    let worker: ChainWorker<TestVault> = ChainWorker::new(
        config,
        single_address_provider,
        executor,
        fetcher.clone(),
        Arc::new(CollectingErrorSink::default()),
        tx,
        Arc::new(Mutex::new(HashMap::new())),
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(vaults, cancel.clone()));
    let mut failures = 0;
    tokio::time::timeout(Duration::from_secs(10), async {
        while failures < 3 {
            let outcome = rx.recv().await.unwrap();
            if !outcome.success {
                assert_eq!(outcome.import_key, "product:investment:c");
                failures += 1;
            }
        }
    })
    .await
    .unwrap();
    cancel.cancel();

    // keep the channel drained until the worker is gone
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    assert!(handle.await.unwrap().is_ok());
    drain.await.unwrap();
}

#[rstest]
#[tokio::test]
async fn failed_batches_are_retried_by_the_executor(vaults: Vec<TestVault>, fast_provider: RpcProvider) {
    let config = TestConfigBuilder::new().providers(vec![fast_provider.clone()]).build();
    let fetcher = Arc::new(FakeFetcher::new(5_000));
    fetcher.fail_batches.store(1, Ordering::SeqCst);
    let sink = Arc::new(CollectingErrorSink::default());

    let (result, _) = run_worker(config.clone(), fast_provider, fetcher, sink.clone(), vaults.clone()).await;
    assert!(result.is_ok());

    for vault in &vaults {
        let ranges = ranges_of(&config, vault).await.unwrap();
        assert!(!ranges.covered_ranges.is_empty(), "{} not covered", vault.id);
        assert!(ranges.to_retry.is_empty());
    }
    assert!(sink.reports.lock().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn exhausted_retries_fail_the_whole_batch(vaults: Vec<TestVault>, fast_provider: RpcProvider) {
    let config = TestConfigBuilder::new().providers(vec![fast_provider.clone()]).build();
    let fetcher = Arc::new(FakeFetcher::new(5_000));
    // more failures than the two attempts the test config allows
    fetcher.fail_batches.store(10, Ordering::SeqCst);
    let sink = Arc::new(CollectingErrorSink::default());

    let (result, last_imported) = run_worker(config.clone(), fast_provider, fetcher, sink.clone(), vaults.clone()).await;
    assert!(result.is_ok());

    for vault in &vaults {
        let ranges = ranges_of(&config, vault).await.unwrap();
        assert!(ranges.covered_ranges.is_empty());
        assert!(!ranges.to_retry.is_empty());
    }
    assert!(sink.reports.lock().await.iter().all(|report| report.error_type == "retries_exhausted"));
    assert!(last_imported.lock().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn missing_limitation_stops_the_worker(vaults: Vec<TestVault>) {
    let unprobed = provider("unprobed.example.org", "min_delay_between_calls: no-limit\n");
    let config = TestConfigBuilder::new().providers(vec![unprobed.clone()]).build();
    let fetcher = Arc::new(FakeFetcher::new(5_000));

    let (result, _) = run_worker(config, unprobed, fetcher.clone(), Arc::new(CollectingErrorSink::default()), vaults).await;
    assert_matches!(result, Err(IndexerError::ConfigError(_)));
    assert!(fetcher.fetched().await.is_empty());
}

#[rstest]
#[tokio::test]
async fn latest_block_is_shared_through_the_cache(vaults: Vec<TestVault>, fast_provider: RpcProvider) {
    let config = TestConfigBuilder::new().providers(vec![fast_provider.clone()]).build();
    let fetcher = Arc::new(FakeFetcher::new(5_000));
    let sink = Arc::new(CollectingErrorSink::default());

    run_worker(config.clone(), fast_provider.clone(), fetcher.clone(), sink.clone(), vaults.clone()).await.0.unwrap();
    run_worker(config, fast_provider, fetcher.clone(), sink, vaults).await.0.unwrap();

    assert_eq!(fetcher.latest_block_calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn block_list_index_keeps_recent_passes_on_the_newest_slice(vaults: Vec<TestVault>, fast_provider: RpcProvider) {
    let config =
        TestConfigBuilder::new().providers(vec![fast_provider.clone()]).range_index(RangeIndexKind::BlockList).build();
    let fetcher = Arc::new(FakeFetcher::new(5_000));

    let (result, _) =
        run_worker(config, fast_provider, fetcher.clone(), Arc::new(CollectingErrorSink::default()), vaults).await;
    assert!(result.is_ok());

    // window [4000, 5000] on a 15 minute grid of 3s blocks: points every 300 blocks from 4000
    let fetched = fetcher.fetched().await;
    assert!(!fetched.is_empty());
    assert!(fetched.iter().all(|query| query.range == Range::new(4_900, 5_000)), "{:?}", fetched);
}

#[rstest]
#[tokio::test]
async fn runner_spreads_entities_and_flushes_on_shutdown(vaults: Vec<TestVault>) {
    let providers = vec![
        provider("one.example.org", "min_delay_between_calls: no-limit\nmethods:\n  eth_get_logs: 100\n"),
        provider("two.example.org", "min_delay_between_calls: no-limit\nmethods:\n  eth_get_logs: 100\n"),
    ];
    let config = TestConfigBuilder::new().providers(providers).build();
    let source = Arc::new(StaticEntitySource::new(vaults.clone()));
    let fetcher = Arc::new(FakeFetcher::new(5_000));
    let runner: ChainRunner<TestVault> =
        ChainRunner::new(config.clone(), source, fetcher.clone(), Arc::new(CollectingErrorSink::default()));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(runner.run(shutdown.clone()));
    tokio::time::timeout(Duration::from_secs(10), async {
        while fetcher.fetched().await.iter().map(|query| query.addresses.len()).sum::<usize>() < vaults.len() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    for vault in &vaults {
        let ranges = ranges_of(&config, vault).await.unwrap();
        assert!(!ranges.covered_ranges.is_empty(), "{} not flushed", vault.id);
    }
    let used: HashSet<String> = fetcher.fetched().await.into_iter().map(|query| query.provider).collect();
    assert_eq!(used.len(), 2);
}

#[rstest]
#[tokio::test]
async fn runner_moves_pruned_entities_to_archive_providers(vaults: Vec<TestVault>) {
    let pruned = provider(
        "pruned.example.org",
        "min_delay_between_calls: no-limit\nmax_get_logs_address_batch_size: 1\nweight: 10\nmethods:\n  eth_get_logs: 100\n",
    );
    let archive = provider(
        "archive.example.org",
        "is_archive_node: true\nmin_delay_between_calls: no-limit\nmax_get_logs_address_batch_size: 1\nweight: 1\n\
         methods:\n  eth_get_logs: 100\n",
    );
    let config = TestConfigBuilder::new()
        .providers(vec![pruned.clone(), archive.clone()])
        .input_poll_interval(Duration::from_millis(20))
        .build();
    let fetcher = Arc::new(FakeFetcher::new(5_000).failing_on("0xc"));
    let runner: ChainRunner<TestVault> = ChainRunner::new(
        config.clone(),
        Arc::new(StaticEntitySource::new(vaults.clone())),
        fetcher.clone(),
        Arc::new(CollectingErrorSink::default()),
    );

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(runner.run(shutdown.clone()));
    // the weights put every vault on the pruned node first
    tokio::time::timeout(Duration::from_secs(10), async {
        while ranges_of(&config, &vaults[2]).await.map_or(true, |ranges| ranges.covered_ranges.is_empty()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let fetched = fetcher.fetched().await;
    let queries_on = |rpc: &RpcProvider, address: &str| {
        fetched.iter().filter(|query| query.provider == rpc.lock_key() && query.addresses.iter().any(|a| a == address)).count()
    };
    assert!(queries_on(&pruned, "0xc") >= 1);
    assert!(queries_on(&archive, "0xc") >= 1);
    assert_eq!(queries_on(&archive, "0xa") + queries_on(&archive, "0xb"), 0);
}

#[rstest]
#[tokio::test]
async fn runner_stops_on_configuration_errors(vaults: Vec<TestVault>) {
    let unprobed = provider("unprobed.example.org", "min_delay_between_calls: no-limit\n");
    let config =
        TestConfigBuilder::new().providers(vec![unprobed]).input_poll_interval(Duration::from_millis(20)).build();
    let runner: ChainRunner<TestVault> = ChainRunner::new(
        config,
        Arc::new(StaticEntitySource::new(vaults)),
        Arc::new(FakeFetcher::new(5_000)),
        Arc::new(CollectingErrorSink::default()),
    );

    let result = tokio::time::timeout(Duration::from_secs(10), runner.run(CancellationToken::new())).await.unwrap();
    assert_matches!(result, Err(IndexerError::ConfigError(_)));
}

#[rstest]
#[tokio::test]
async fn runner_rejects_an_empty_provider_list() {
    let config = TestConfigBuilder::new().build();
    let runner: ChainRunner<TestVault> = ChainRunner::new(
        config,
        Arc::new(StaticEntitySource::new(Vec::new())),
        Arc::new(FakeFetcher::new(5_000)),
        Arc::new(CollectingErrorSink::default()),
    );
    assert_matches!(runner.run(CancellationToken::new()).await, Err(IndexerError::ConfigError(_)));
}
