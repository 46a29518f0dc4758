pub mod error;
pub mod memory;
pub mod mongodb;

use async_trait::async_trait;
pub use error::CacheError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

/// Key-value store of JSON encoded values with a per-entry time to live
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Value stored under `key`, `None` when missing or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

/// Check the store, compute on a miss and write the result back when it is not `None`.
///
/// An entry that no longer decodes into `T` counts as a miss.
pub async fn get_or_compute<T, E, F, Fut>(
    cache: &dyn CacheClient,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<Option<T>, E>
where
    T: Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    if let Some(raw) = cache.get(key).await? {
        match serde_json::from_str(&raw) {
            Ok(value) => {
                trace!(key, "Cache hit");
                return Ok(Some(value));
            }
            Err(e) => warn!(key, error = %e, "Ignoring undecodable cache entry"),
        }
    }

    let computed = compute().await?;
    if let Some(value) = &computed {
        let raw = serde_json::to_string(value)
            .map_err(|source| CacheError::EncodeError { key: key.to_string(), source })?;
        cache.set(key, raw, ttl).await?;
    }
    Ok(computed)
}
