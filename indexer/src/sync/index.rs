//! Range-index strategies: where the optimizer cuts the value axis into slices.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::sync::range::{range_merge, range_split_many_to_max_length};
use crate::types::params::ImportMode;
use crate::types::range::{Range, RangeValue};

/// Builds the vertical slices a batch of queries is aligned on.
///
/// `needed` holds every entity's missing ranges; a builder may ignore it and cut
/// along an external grid instead. Slices must not overlap each other.
pub trait RangeIndexBuilder<T: RangeValue>: Send + Sync {
    fn build_slices(&self, needed: &[Range<T>]) -> Vec<Range<T>>;
}

/// Clusters nearby missing ranges into contiguous blobs, then slices them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRangeIndex {
    /// Gaps of at most this many values are swallowed into the surrounding blob.
    pub merge_if_closer_than: u64,
    pub vertical_slices_size: u64,
}

impl<T: RangeValue> RangeIndexBuilder<T> for BlobRangeIndex {
    fn build_slices(&self, needed: &[Range<T>]) -> Vec<Range<T>> {
        let mut blobs: Vec<Range<T>> = Vec::new();
        for range in range_merge(needed) {
            match blobs.last_mut() {
                Some(last) if T::span(last.to.next_value(), range.from.prev_value()) <= self.merge_if_closer_than => {
                    last.to = range.to;
                }
                _ => blobs.push(range),
            }
        }
        range_split_many_to_max_length(&blobs, self.vertical_slices_size)
    }
}

/// A block observed (or interpolated) at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSample {
    pub number: u64,
    pub datetime: DateTime<Utc>,
}

/// Slices aligned on known blocks sampled at a fixed cadence, e.g. one block every 15 minutes.
#[derive(Debug, Clone)]
pub struct BlockListRangeIndex {
    pub samples: Vec<BlockSample>,
    pub latest_block_number: u64,
    pub sampling_interval: Duration,
    pub ms_per_block_estimate: u64,
    pub max_blocks_per_query: u64,
    pub mode: ImportMode,
}

impl BlockListRangeIndex {
    fn slice_size(&self) -> u64 {
        let interval_ms = u64::try_from(self.sampling_interval.as_millis()).unwrap_or(u64::MAX);
        (interval_ms / self.ms_per_block_estimate.max(1)).min(self.max_blocks_per_query).max(1)
    }
}

impl RangeIndexBuilder<u64> for BlockListRangeIndex {
    fn build_slices(&self, _needed: &[Range<u64>]) -> Vec<Range<u64>> {
        let mut numbers: Vec<u64> = self.samples.iter().map(|sample| sample.number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        let Some(&last) = numbers.last() else {
            return Vec::new();
        };

        let mut ranges: Vec<Range<u64>> = numbers.windows(2).map(|pair| Range::new(pair[0], pair[1] - 1)).collect();
        ranges.push(Range::new(last, self.latest_block_number.max(last)));

        let mut slices = range_split_many_to_max_length(&ranges, self.slice_size());
        if self.mode == ImportMode::Recent {
            // only the newest point matters
            slices = slices.pop().into_iter().collect();
        }
        slices
    }
}

/// Linear interpolation of block numbers at every `interval` tick between known samples.
///
/// Ticks are aligned on the first sample. Samples must be sorted by time; unsorted or
/// duplicated times are skipped.
pub fn interpolate_block_samples(known: &[BlockSample], interval: Duration) -> Vec<BlockSample> {
    let Ok(step) = chrono::Duration::from_std(interval) else {
        return known.to_vec();
    };
    if step <= chrono::Duration::zero() || known.is_empty() {
        return known.to_vec();
    }

    let mut result = Vec::new();
    let mut tick = known[0].datetime;
    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let elapsed_ms = (b.datetime - a.datetime).num_milliseconds();
        if elapsed_ms <= 0 || b.number < a.number {
            continue;
        }
        while tick < b.datetime {
            if tick >= a.datetime {
                let offset_ms = (tick - a.datetime).num_milliseconds();
                let blocks = (b.number - a.number) as f64 * offset_ms as f64 / elapsed_ms as f64;
                result.push(BlockSample { number: a.number + blocks.round() as u64, datetime: tick });
            }
            tick += step;
        }
    }
    if let Some(last) = known.last() {
        if result.last().map_or(true, |sample| sample.datetime < last.datetime) {
            result.push(*last);
        }
    }
    result
}

/// Grid of samples every `interval` from `first_block` up to the tip, assuming a steady block time.
///
/// The tip closes the last slice rather than opening one, so it is not part of the grid.
pub fn estimate_block_samples(
    first_block: u64,
    tip: BlockSample,
    ms_per_block_estimate: u64,
    interval: Duration,
) -> Vec<BlockSample> {
    let first_block = first_block.min(tip.number);
    let elapsed_ms = (tip.number - first_block).saturating_mul(ms_per_block_estimate);
    let first_datetime = chrono::Duration::try_milliseconds(i64::try_from(elapsed_ms).unwrap_or(i64::MAX))
        .and_then(|elapsed| tip.datetime.checked_sub_signed(elapsed))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut samples =
        interpolate_block_samples(&[BlockSample { number: first_block, datetime: first_datetime }, tip], interval);
    if samples.len() > 1 {
        samples.pop();
    }
    samples
}
