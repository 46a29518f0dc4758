pub mod database;
pub mod providers;

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::{Display, EnumString};

use crate::cli::import::ImportCliArgs;
use crate::cli::rpc::RpcCliArgs;
use crate::cli::service::ServiceCliArgs;
use crate::error::ConfigError;
use crate::types::range::Range;

/// Which part of history a pass looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImportMode {
    /// Only the newest window of blocks.
    Recent,
    /// Everything since contract creation that is not covered yet.
    Historical,
}

/// Whether historical passes leave the recent window to the recent pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SkipRecentWindow {
    All,
    None,
    /// Only for entities still changing.
    Live,
    /// Only for end-of-life entities.
    Eol,
}

impl SkipRecentWindow {
    pub fn applies_to(&self, is_live: bool) -> bool {
        match self {
            SkipRecentWindow::All => true,
            SkipRecentWindow::None => false,
            SkipRecentWindow::Live => is_live,
            SkipRecentWindow::Eol => !is_live,
        }
    }
}

/// How the optimizer cuts the block axis into slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RangeIndexKind {
    /// Clusters of nearby missing ranges.
    Blob,
    /// A grid of blocks estimated every `block_sampling_interval` from the chain tip.
    BlockList,
}

/// How a pass turns import state into ranges to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBehaviour {
    pub mode: ImportMode,
    /// Blocks kept away from the chain tip to avoid reorganisations.
    pub wait_for_block_propagation: u64,
    pub force_considered_block_range: Option<Range<u64>>,
    pub skip_recent_window_when_historical: SkipRecentWindow,
    pub ignore_import_state: bool,
    /// Turns recoverable range inconsistencies into errors.
    pub strict: bool,
    /// Loop the whole pass, waiting at least this long between starts.
    pub repeat_at_most_every: Option<Duration>,
    pub input_poll_interval: Duration,
}

impl Default for ImportBehaviour {
    fn default() -> Self {
        Self {
            mode: ImportMode::Recent,
            wait_for_block_propagation: 0,
            force_considered_block_range: None,
            skip_recent_window_when_historical: SkipRecentWindow::All,
            ignore_import_state: false,
            strict: false,
            repeat_at_most_every: None,
            input_poll_interval: Duration::from_secs(300),
        }
    }
}

/// Buffering and concurrency of the worker pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Upper bound on input objects in one batch, before provider limits.
    pub max_input_take: usize,
    /// Parallel batches for providers without a minimum delay.
    pub work_concurrency: usize,
    pub updater_max_buffer: usize,
    pub updater_max_wait_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_input_take: 500,
            work_concurrency: 10,
            updater_max_buffer: 100,
            updater_max_wait_ms: 1_000,
        }
    }
}

/// Query shaping knobs before provider limits are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerDefaults {
    pub max_addresses_per_query: usize,
    pub max_blocks_per_query: u64,
    pub max_queries_per_product: usize,
    pub merge_if_closer_than: u64,
    pub vertical_slices_size: u64,
    pub range_index: RangeIndexKind,
    pub block_sampling_interval: Duration,
}

impl Default for OptimizerDefaults {
    fn default() -> Self {
        Self {
            max_addresses_per_query: 50,
            max_blocks_per_query: 10_000,
            max_queries_per_product: 10,
            merge_if_closer_than: 1_000,
            vertical_slices_size: 10_000,
            range_index: RangeIndexKind::Blob,
            block_sampling_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Exponential backoff with jitter around physical RPC calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay_ms: 500, max_delay_ms: 30_000 }
    }
}

impl RetryConfig {
    /// Delays between attempts: doubling from `base_delay_ms` up to `max_delay_ms`, jittered.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)))
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
    }
}

/// Settings shared by every pipeline of one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub chain: String,
    pub ms_per_block_estimate: u64,
    pub latest_block_cache_ttl: Duration,
}

/// Distributed lock timings used around rate-limited calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockParams {
    pub acquire_timeout_ms: u64,
    pub expiry_seconds: u64,
}

impl Default for LockParams {
    fn default() -> Self {
        Self { acquire_timeout_ms: 60_000, expiry_seconds: 120 }
    }
}

impl TryFrom<&ImportCliArgs> for ImportBehaviour {
    type Error = ConfigError;

    fn try_from(args: &ImportCliArgs) -> Result<Self, Self::Error> {
        let force_considered_block_range = match (args.force_from_block, args.force_to_block) {
            (Some(from), Some(to)) if from <= to => Some(Range::new(from, to)),
            (Some(from), Some(to)) => {
                return Err(ConfigError::InconsistentRange {
                    import_key: "*".to_string(),
                    details: format!("forced block range [{}, {}] is inverted", from, to),
                })
            }
            (None, None) => None,
            _ => return Err(ConfigError::MissingArgument("force_from_block and force_to_block".to_string())),
        };
        Ok(Self {
            mode: args.mode,
            wait_for_block_propagation: args.wait_for_block_propagation,
            force_considered_block_range,
            skip_recent_window_when_historical: args.skip_recent_window,
            ignore_import_state: args.ignore_import_state,
            strict: args.strict,
            repeat_at_most_every: args.repeat_at_most_every_secs.map(Duration::from_secs),
            input_poll_interval: Duration::from_secs(args.input_poll_interval_secs.max(1)),
        })
    }
}

impl From<&ImportCliArgs> for OptimizerDefaults {
    fn from(args: &ImportCliArgs) -> Self {
        Self {
            max_addresses_per_query: args.max_addresses_per_query.max(1),
            max_blocks_per_query: args.max_blocks_per_query.max(1),
            max_queries_per_product: args.max_queries_per_product.max(1),
            merge_if_closer_than: args.merge_if_closer_than,
            vertical_slices_size: args.vertical_slices_size.max(1),
            range_index: args.range_index,
            block_sampling_interval: Duration::from_secs(args.block_sampling_interval_secs.max(1)),
        }
    }
}

impl From<&ServiceCliArgs> for StreamConfig {
    fn from(args: &ServiceCliArgs) -> Self {
        Self {
            max_input_take: args.max_input_take,
            work_concurrency: args.work_concurrency,
            updater_max_buffer: args.updater_max_buffer,
            updater_max_wait_ms: args.updater_max_wait_ms,
        }
    }
}

impl From<&RpcCliArgs> for RetryConfig {
    fn from(args: &RpcCliArgs) -> Self {
        Self {
            max_attempts: args.rpc_max_attempts.max(1),
            base_delay_ms: args.rpc_base_delay_ms,
            max_delay_ms: args.rpc_max_delay_ms,
        }
    }
}

impl From<&RpcCliArgs> for LockParams {
    fn from(args: &RpcCliArgs) -> Self {
        Self { acquire_timeout_ms: args.lock_acquire_timeout_ms, expiry_seconds: args.lock_expiry_seconds }
    }
}
