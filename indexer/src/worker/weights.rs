//! Provider weights and the weighted routing of entities across providers.

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::types::limitations::{MinDelay, RpcLimitations};
use crate::types::range::Range;

const NO_LIMIT_WEIGHT: u64 = 10_000;
const MIN_DELAY_FLOOR_MS: u64 = 500;

/// Share of the entities a provider receives; faster providers get proportionally more.
pub fn provider_weight(limitations: &RpcLimitations) -> u64 {
    if let Some(weight) = limitations.weight {
        return weight;
    }
    match limitations.min_delay_between_calls {
        MinDelay::NoLimit => NO_LIMIT_WEIGHT,
        MinDelay::Millis(ms) => (1_000_000.0 / ms.max(MIN_DELAY_FLOOR_MS) as f64).round() as u64,
    }
}

/// Branches owning contiguous slices of `[1, total_weight]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedBranches<K> {
    branches: Vec<(K, Range<u64>)>,
    total_weight: u64,
}

impl<K> WeightedBranches<K> {
    /// Lays weights out back to back in the given order.
    pub fn from_weights(weights: Vec<(K, u64)>) -> Result<Self, ConfigError> {
        let mut next = 1u64;
        let mut branches = Vec::with_capacity(weights.len());
        for (index, (key, weight)) in weights.into_iter().enumerate() {
            if weight == 0 {
                return Err(ConfigError::InvalidWeights(format!("branch {} has a zero weight", index)));
            }
            let to = next
                .checked_add(weight - 1)
                .ok_or_else(|| ConfigError::InvalidWeights("total weight overflows".to_string()))?;
            branches.push((key, Range::new(next, to)));
            next = to.saturating_add(1);
        }
        Self::from_ranges(branches)
    }

    /// Takes explicit weight ranges, which must tile `[1, total]` in order.
    pub fn from_ranges(branches: Vec<(K, Range<u64>)>) -> Result<Self, ConfigError> {
        let mut expected_from = 1u64;
        for (index, (_, range)) in branches.iter().enumerate() {
            if !range.is_valid() {
                return Err(ConfigError::InvalidWeights(format!("branch {} has an inverted range {}", index, range)));
            }
            if range.from != expected_from {
                return Err(ConfigError::InvalidWeights(format!(
                    "branch {} starts at {} instead of {}",
                    index, range.from, expected_from
                )));
            }
            expected_from = range.to.saturating_add(1);
        }
        let Some(total_weight) = branches.last().map(|(_, range)| range.to) else {
            return Err(ConfigError::InvalidWeights("no branch configured".to_string()));
        };
        Ok(Self { branches, total_weight })
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.branches.iter().map(|(key, _)| key)
    }

    /// Branch whose range contains `point`; points past the total land on the last branch.
    pub fn branch_for(&self, point: u64) -> &K {
        let index = self.branches.partition_point(|(_, range)| range.to < point).min(self.branches.len() - 1);
        &self.branches[index].0
    }
}

/// Routes one item: draws uniformly in `[1, total_weight]`.
pub fn weighted_distribute<'a, K, R: Rng + ?Sized>(branches: &'a WeightedBranches<K>, rng: &mut R) -> &'a K {
    branches.branch_for(rng.gen_range(1..=branches.total_weight))
}

/// Splits a whole list at once, keeping the input order inside each branch.
///
/// Item `i` of `n` sits at point `i * total / n + 1`, so every branch gets its
/// proportional share up to rounding. Every branch is returned, possibly empty.
pub fn weighted_split<K: Clone, T>(branches: &WeightedBranches<K>, items: Vec<T>) -> Vec<(K, Vec<T>)> {
    let mut split: Vec<(K, Vec<T>)> = branches.keys().map(|key| (key.clone(), Vec::new())).collect();
    let count = items.len() as u128;
    let total = branches.total_weight as u128;
    for (position, item) in items.into_iter().enumerate() {
        let point = (position as u128 * total / count) as u64 + 1;
        let index = branches.branches.partition_point(|(_, range)| range.to < point).min(split.len() - 1);
        split[index].1.push(item);
    }
    split
}

/// Forwards every item of `input` to one output drawn with [`weighted_distribute`].
///
/// Stops when the input closes. Items drawn for a closed output are dropped.
pub async fn weighted_multiplex<T, R>(mut input: mpsc::Receiver<T>, outputs: WeightedBranches<mpsc::Sender<T>>, mut rng: R)
where
    R: Rng + Send,
{
    let mut forwarded = 0usize;
    while let Some(item) = input.recv().await {
        let output = weighted_distribute(&outputs, &mut rng);
        if output.send(item).await.is_err() {
            warn!("Weighted output closed, dropping item");
            continue;
        }
        forwarded += 1;
    }
    debug!(forwarded, "Weighted multiplex input closed");
}
