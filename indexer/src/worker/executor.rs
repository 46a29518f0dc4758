use backon::Retryable;
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace, warn};
use uuid::Uuid;

use crate::core::client::lock::LockClient;
use crate::core::client::rpc::RpcError;
use crate::types::limitations::RpcProvider;
use crate::types::params::{LockParams, RetryConfig};
use crate::utils::time::remaining_delay;

/// Wraps every physical RPC call: per-provider lock, minimum spacing between calls
/// and retries with exponential backoff and jitter.
///
/// Spacing is tracked in the lock backend, so processes sharing it never call one
/// provider faster than its `min_delay_between_calls`. Every call holds the lock under
/// its own owner, so concurrent calls of one executor exclude each other too.
pub struct RateLimitedExecutor {
    lock: Arc<dyn LockClient>,
    retry: RetryConfig,
    lock_params: LockParams,
    owner_prefix: String,
    calls: AtomicU64,
}

impl RateLimitedExecutor {
    pub fn new(lock: Arc<dyn LockClient>, retry: RetryConfig, lock_params: LockParams) -> Self {
        Self { lock, retry, lock_params, owner_prefix: format!("indexer-{}", Uuid::new_v4()), calls: AtomicU64::new(0) }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error or runs out of attempts.
    pub async fn execute<R, F, Fut>(&self, provider: &RpcProvider, operation: &str, call: F) -> Result<R, RpcError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R, RpcError>>,
    {
        let result = (|| self.execute_once(provider, &call))
            .retry(self.retry.backoff())
            .when(RpcError::is_retryable)
            .notify(|e: &RpcError, delay: Duration| {
                warn!(
                    provider = %provider.lock_key(),
                    operation,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "RPC call failed, retrying"
                );
            })
            .await;

        result.map_err(|e| {
            if !e.is_retryable() {
                error!(
                    provider = %provider.lock_key(),
                    operation,
                    error_type = e.error_type(),
                    error = %e,
                    "RPC call failed, not retrying"
                );
                return e;
            }
            let attempts = self.retry.max_attempts.max(1);
            warn!(provider = %provider.lock_key(), operation, attempts, error = %e, "Giving up");
            RpcError::RetriesExhausted { attempts, last_error: e.to_string() }
        })
    }

    async fn execute_once<R, F, Fut>(&self, provider: &RpcProvider, call: &F) -> Result<R, RpcError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R, RpcError>>,
    {
        let Some(min_delay) = provider.limitations.min_delay_between_calls.as_duration() else {
            return call().await;
        };

        let key = format!("rpc:{}", provider.lock_key());
        let owner = format!("{}:{}", self.owner_prefix, self.calls.fetch_add(1, Ordering::Relaxed));
        self.lock
            .acquire_lock_with_timeout(&key, &owner, self.lock_params.acquire_timeout_ms, self.lock_params.expiry_seconds)
            .await?;
        let result = self.spaced_call(&key, min_delay, call).await;
        if let Err(e) = self.lock.release_lock(&key, &owner).await {
            // expiry frees it eventually
            warn!(key, error = %e, "Failed to release provider lock");
        }
        result
    }

    async fn spaced_call<R, F, Fut>(&self, key: &str, min_delay: Duration, call: &F) -> Result<R, RpcError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R, RpcError>>,
    {
        if let Some(last_call) = self.lock.get_last_call(key).await? {
            let wait = remaining_delay(last_call, Utc::now(), min_delay);
            if !wait.is_zero() {
                trace!(key, wait_ms = wait.as_millis() as u64, "Waiting for provider delay");
                tokio::time::sleep(wait).await;
            }
        }

        self.lock.record_call(key, Utc::now()).await?;
        let result = call().await;
        // a slow call pushes the next one back as well
        let recorded = self.lock.record_call(key, Utc::now()).await;
        let value = result?;
        recorded?;
        Ok(value)
    }
}
