use super::{CacheClient, CacheError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-local cache; expiry follows the tokio clock so paused tests can advance it.
#[derive(Default)]
pub struct InMemoryCacheClient {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCacheClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheClient for InMemoryCacheClient {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.lock().await.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}
