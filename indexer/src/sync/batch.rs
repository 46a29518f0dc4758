use strum::IntoEnumIterator;

use crate::error::ConfigError;
use crate::types::limitations::{MinDelay, RpcCallKind, RpcCallsPerEntity, RpcLimitations};
use crate::types::params::StreamConfig;

/// How a worker groups input objects into physical calls on one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_input_objs_per_batch: usize,
    /// Batches in flight at once; above 1 only for providers without a minimum delay.
    pub work_concurrency: usize,
}

/// Largest batch that keeps every call kind under the provider's batching limit.
///
/// A kind the provider was never probed for is a configuration error; a kind probed
/// as unsafe to batch (`None`) disables batching.
pub fn get_batch_config_from_limitations(
    calls_per_entity: &RpcCallsPerEntity,
    limitations: &RpcLimitations,
    stream: &StreamConfig,
    provider: &str,
) -> Result<BatchConfig, ConfigError> {
    let mut max_input_objs_per_batch = stream.max_input_take.max(1);

    for kind in RpcCallKind::iter() {
        let calls = calls_per_entity.count(kind);
        if calls == 0 {
            continue;
        }
        let limit = limitations.methods.get(&kind).ok_or_else(|| ConfigError::MissingLimitation {
            method: kind.to_string(),
            provider: provider.to_string(),
        })?;
        let achievable = match limit {
            None => 1,
            Some(limit) => limit / calls as usize,
        };
        max_input_objs_per_batch = max_input_objs_per_batch.min(achievable);
    }

    let work_concurrency = match limitations.min_delay_between_calls {
        MinDelay::NoLimit => stream.work_concurrency.max(1),
        MinDelay::Millis(_) => 1,
    };
    Ok(BatchConfig { max_input_objs_per_batch: max_input_objs_per_batch.max(1), work_concurrency })
}
