use clap::Args;
use std::path::PathBuf;

/// Providers and the way calls to them are paced and retried.
#[derive(Debug, Clone, Args)]
pub struct RpcCliArgs {
    /// YAML file listing the chain, its providers and their probed limitations.
    #[arg(env = "VAULT_INDEXER_PROVIDERS_FILE", long, value_name = "PATH")]
    pub providers_file: PathBuf,

    /// Timeout of one HTTP request to a provider, in seconds.
    #[arg(env = "VAULT_INDEXER_RPC_TIMEOUT", long, default_value = "30")]
    pub rpc_timeout_secs: u64,

    /// Attempts per physical call before the affected entities are reported.
    #[arg(env = "VAULT_INDEXER_RPC_MAX_ATTEMPTS", long, default_value = "5")]
    pub rpc_max_attempts: u32,

    #[arg(env = "VAULT_INDEXER_RPC_BASE_DELAY_MS", long, default_value = "500")]
    pub rpc_base_delay_ms: u64,

    #[arg(env = "VAULT_INDEXER_RPC_MAX_DELAY_MS", long, default_value = "30000")]
    pub rpc_max_delay_ms: u64,

    /// How long to wait for a provider lock held by another process.
    #[arg(env = "VAULT_INDEXER_LOCK_ACQUIRE_TIMEOUT_MS", long, default_value = "60000")]
    pub lock_acquire_timeout_ms: u64,

    /// A provider lock left by a crashed process expires after this many seconds.
    #[arg(env = "VAULT_INDEXER_LOCK_EXPIRY_SECONDS", long, default_value = "120")]
    pub lock_expiry_seconds: u64,
}
