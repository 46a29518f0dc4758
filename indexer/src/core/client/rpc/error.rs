use crate::core::client::lock::LockError;
use crate::error::ConfigError;

/// Substrings providers use when a call needs state a pruned node no longer has.
const ARCHIVE_NODE_PATTERNS: &[&str] = &[
    "missing trie node",
    "header not found",
    "archive",
    "historical state",
    "state is not available",
    "pruned",
];

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Network, timeout and rate limit failures, worth another attempt
    #[error("Transient error during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// The provider is not an archive node and cannot serve this call
    #[error("Archive node needed for {operation}: {message}")]
    ArchiveNodeNeeded { operation: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid response for {operation}: {message}")]
    InvalidResponse { operation: String, message: String },

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl RpcError {
    /// Configuration errors and archive node errors surface immediately instead of being retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transient { .. } | RpcError::InvalidResponse { .. } | RpcError::Lock(_))
    }

    /// Get error type as a string for logs
    pub fn error_type(&self) -> &'static str {
        match self {
            RpcError::Transient { .. } => "transient",
            RpcError::ArchiveNodeNeeded { .. } => "archive_node_needed",
            RpcError::Configuration(_) => "configuration",
            RpcError::InvalidResponse { .. } => "invalid_response",
            RpcError::Lock(_) => "lock",
            RpcError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// Classify an error message returned by a provider
    pub fn from_provider_message(operation: impl Into<String>, message: impl Into<String>) -> Self {
        let operation = operation.into();
        let message = message.into();
        let lowered = message.to_lowercase();
        if ARCHIVE_NODE_PATTERNS.iter().any(|pattern| lowered.contains(pattern)) {
            RpcError::ArchiveNodeNeeded { operation, message }
        } else {
            RpcError::Transient { operation, message }
        }
    }

    /// Create an error from a reqwest error
    pub fn from_reqwest_error(operation: impl Into<String>, source: reqwest::Error) -> Self {
        let operation = operation.into();
        if source.is_decode() {
            return RpcError::InvalidResponse { operation, message: source.to_string() };
        }
        let message = if source.is_timeout() {
            "request timed out".to_string()
        } else if source.is_connect() {
            format!("connection failed: {}", source)
        } else {
            source.to_string()
        };
        RpcError::from_provider_message(operation, message)
    }
}
