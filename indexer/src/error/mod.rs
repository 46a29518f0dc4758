use thiserror::Error;

use crate::core::client::cache::CacheError;
use crate::core::client::database::DatabaseError;
use crate::core::client::lock::LockError;
use crate::core::client::rpc::RpcError;

/// Result type for indexer operations
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Configuration and programmer errors.
///
/// These are never retried: the operation that raised one fails immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid weight configuration: {0}")]
    InvalidWeights(String),

    #[error("Missing RPC limitation for {method} on {provider}")]
    MissingLimitation { method: String, provider: String },

    #[error("Inconsistent range for {import_key}: {details}")]
    InconsistentRange { import_key: String, details: String },

    #[error("Import state {import_key} does not store {expected} ranges")]
    RangeKindMismatch { import_key: String, expected: &'static str },

    #[error("Invalid providers file: {0}")]
    InvalidProvidersFile(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),
}

/// Error types for the indexer
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Lock error: {0}")]
    LockError(#[from] LockError),

    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    #[error("RPC error: {0}")]
    RpcError(#[from] RpcError),

    #[error("Entity source error: {0}")]
    EntitySourceError(String),

    #[error("Worker error: {0}")]
    WorkerError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Indexer error: {0}")]
    IndexerAnyHowError(#[from] anyhow::Error),
}
