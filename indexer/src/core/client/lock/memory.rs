use super::{LockClient, LockError, LockInfo, LockResult};
use crate::utils::time::saturating_add;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Process-local lock client, for tests and single-instance runs
#[derive(Default)]
pub struct InMemoryLockClient {
    locks: Mutex<HashMap<String, LockInfo>>,
    last_calls: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryLockClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockClient for InMemoryLockClient {
    async fn acquire_lock(&self, key: &str, owner: &str, expiry_seconds: u64) -> Result<LockResult, LockError> {
        let now = Utc::now();
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(key) {
            if lock.expires_at > now && lock.owner != owner {
                return Ok(LockResult::AlreadyHeld(lock.owner.clone()));
            }
        }
        let expires_at = saturating_add(now, Duration::from_secs(expiry_seconds));
        locks.insert(key.to_string(), LockInfo { _id: key.to_string(), owner: owner.to_string(), expires_at });
        Ok(LockResult::Acquired)
    }

    async fn release_lock(&self, key: &str, owner: &str) -> Result<LockResult, LockError> {
        let mut locks = self.locks.lock().await;
        match locks.get(key) {
            None => Ok(LockResult::NotFound),
            Some(lock) if lock.owner == owner => {
                locks.remove(key);
                Ok(LockResult::Released)
            }
            Some(lock) if lock.expires_at <= Utc::now() => Ok(LockResult::NotFound),
            Some(lock) => Err(LockError::NotOwner { key: key.to_string(), owner: lock.owner.clone() }),
        }
    }

    async fn get_lock_owner(&self, key: &str) -> Result<Option<String>, LockError> {
        let locks = self.locks.lock().await;
        Ok(locks.get(key).filter(|lock| lock.expires_at > Utc::now()).map(|lock| lock.owner.clone()))
    }

    async fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.get_lock_owner(key).await?.is_some())
    }

    async fn get_last_call(&self, key: &str) -> Result<Option<DateTime<Utc>>, LockError> {
        Ok(self.last_calls.lock().await.get(key).copied())
    }

    async fn record_call(&self, key: &str, at: DateTime<Utc>) -> Result<(), LockError> {
        let mut last_calls = self.last_calls.lock().await;
        let entry = last_calls.entry(key.to_string()).or_insert(at);
        *entry = (*entry).max(at);
        Ok(())
    }
}
