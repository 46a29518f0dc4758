pub mod constant;
pub mod error;
pub mod memory;
pub mod mongodb;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use constant::LOCK_POLL_INTERVAL_MS;
pub use error::LockError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lock information containing owner and expiry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LockInfo {
    pub _id: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of lock acquisition attempts
#[derive(Debug, Clone, PartialEq)]
pub enum LockResult {
    Acquired,
    AlreadyHeld(String), // Contains current owner
    Released,
    NotFound,
}

/// Mutual exclusion and call bookkeeping shared by every process pointing at the same backend.
///
/// A lock is keyed by an arbitrary string and expires on its own after `expiry_seconds`,
/// so a crashed holder never blocks a provider forever. Acquiring is re-entrant for the
/// same owner: tasks that must exclude each other use distinct owner names.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockClient: Send + Sync {
    /// Acquire a lock if it is free, expired or already owned by `owner`
    async fn acquire_lock(&self, key: &str, owner: &str, expiry_seconds: u64) -> Result<LockResult, LockError>;

    /// Poll `acquire_lock` until it succeeds or `timeout_ms` elapses
    async fn acquire_lock_with_timeout(
        &self,
        key: &str,
        owner: &str,
        timeout_ms: u64,
        expiry_seconds: u64,
    ) -> Result<LockResult, LockError> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            match self.acquire_lock(key, owner, expiry_seconds).await? {
                LockResult::AlreadyHeld(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(LOCK_POLL_INTERVAL_MS)).await;
                }
                LockResult::AlreadyHeld(_) => {
                    return Err(LockError::LockTimeout { key: key.to_string(), timeout_ms });
                }
                result => return Ok(result),
            }
        }
    }

    /// Release a lock if owned by the specified owner
    async fn release_lock(&self, key: &str, owner: &str) -> Result<LockResult, LockError>;

    /// Check if a lock exists and get its current owner
    async fn get_lock_owner(&self, key: &str) -> Result<Option<String>, LockError>;

    /// Check if a lock is currently held
    async fn is_locked(&self, key: &str) -> Result<bool, LockError>;

    /// Time of the most recent call recorded under `key`
    async fn get_last_call(&self, key: &str) -> Result<Option<DateTime<Utc>>, LockError>;

    /// Record a call under `key`, never moving the stored time backwards
    async fn record_call(&self, key: &str, at: DateTime<Utc>) -> Result<(), LockError>;
}
