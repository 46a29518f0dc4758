use clap::Args;
use std::path::PathBuf;

use crate::types::params::{ImportMode, RangeIndexKind, SkipRecentWindow};

/// What a pass imports and how queries are shaped.
#[derive(Debug, Clone, Args)]
pub struct ImportCliArgs {
    /// JSON file listing the contracts to index. Re-read on every poll.
    #[arg(env = "VAULT_INDEXER_ENTITIES_FILE", long, value_name = "PATH")]
    pub entities_file: PathBuf,

    #[arg(env = "VAULT_INDEXER_IMPORT_MODE", long, default_value_t = ImportMode::Recent)]
    pub mode: ImportMode,

    /// Blocks kept away from the chain tip.
    #[arg(env = "VAULT_INDEXER_WAIT_FOR_BLOCK_PROPAGATION", long, default_value = "0")]
    pub wait_for_block_propagation: u64,

    /// Restrict every pass to blocks from this one.
    #[arg(env = "VAULT_INDEXER_FORCE_FROM_BLOCK", long, requires = "force_to_block")]
    pub force_from_block: Option<u64>,

    /// Restrict every pass to blocks up to this one.
    #[arg(env = "VAULT_INDEXER_FORCE_TO_BLOCK", long, requires = "force_from_block")]
    pub force_to_block: Option<u64>,

    #[arg(env = "VAULT_INDEXER_SKIP_RECENT_WINDOW", long, default_value_t = SkipRecentWindow::All)]
    pub skip_recent_window: SkipRecentWindow,

    /// Fetch everything again, ignoring what the import state says is covered.
    #[arg(env = "VAULT_INDEXER_IGNORE_IMPORT_STATE", long, default_value_t = false)]
    pub ignore_import_state: bool,

    /// Fail on inconsistent ranges instead of working around them.
    #[arg(env = "VAULT_INDEXER_STRICT", long, default_value_t = false)]
    pub strict: bool,

    /// Loop passes, starting them at most this many seconds apart.
    #[arg(env = "VAULT_INDEXER_REPEAT_AT_MOST_EVERY", long)]
    pub repeat_at_most_every_secs: Option<u64>,

    /// Seconds between two reads of the entities file.
    #[arg(env = "VAULT_INDEXER_INPUT_POLL_INTERVAL", long, default_value = "300")]
    pub input_poll_interval_secs: u64,

    #[arg(env = "VAULT_INDEXER_MAX_ADDRESSES_PER_QUERY", long, default_value = "50")]
    pub max_addresses_per_query: usize,

    #[arg(env = "VAULT_INDEXER_MAX_BLOCKS_PER_QUERY", long, default_value = "10000")]
    pub max_blocks_per_query: u64,

    #[arg(env = "VAULT_INDEXER_MAX_QUERIES_PER_PRODUCT", long, default_value = "10")]
    pub max_queries_per_product: usize,

    /// Gaps of at most this many blocks are fetched rather than split around.
    #[arg(env = "VAULT_INDEXER_MERGE_IF_CLOSER_THAN", long, default_value = "1000")]
    pub merge_if_closer_than: u64,

    #[arg(env = "VAULT_INDEXER_VERTICAL_SLICES_SIZE", long, default_value = "10000")]
    pub vertical_slices_size: u64,

    /// Where queries are cut: around clusters of missing blocks, or on a time grid.
    #[arg(env = "VAULT_INDEXER_RANGE_INDEX", long, default_value_t = RangeIndexKind::Blob)]
    pub range_index: RangeIndexKind,

    /// Seconds between two grid points of the block-list index.
    #[arg(env = "VAULT_INDEXER_BLOCK_SAMPLING_INTERVAL", long, default_value = "900")]
    pub block_sampling_interval_secs: u64,
}
