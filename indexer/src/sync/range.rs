//! Interval algebra over inclusive ranges.
//!
//! Every function here is pure and total: invalid (`from > to`) ranges are dropped
//! instead of causing errors, and degenerate inputs produce empty outputs.

use crate::types::range::{Range, RangeValue, SortOrder};

/// Sorts by `from` and coalesces overlapping or adjacent ranges.
pub fn range_merge<T: RangeValue>(ranges: &[Range<T>]) -> Vec<Range<T>> {
    let mut sorted: Vec<Range<T>> = ranges.iter().copied().filter(Range::is_valid).collect();
    sorted.sort_by_key(|range| (range.from, range.to));

    let mut merged: Vec<Range<T>> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.from <= last.to.next_value() => {
                last.to = last.to.max(range.to);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Subtracts `to_exclude` from `ranges`, splitting ranges that straddle an excluded interval.
///
/// The result is merged.
pub fn range_exclude<T: RangeValue>(ranges: &[Range<T>], to_exclude: &[Range<T>]) -> Vec<Range<T>> {
    let exclusions = range_merge(to_exclude);
    let mut result = Vec::new();

    for range in range_merge(ranges) {
        let mut remaining = Some(range);
        for exclusion in &exclusions {
            let Some(current) = remaining else { break };
            if exclusion.from > current.to {
                break;
            }
            if !current.overlaps(exclusion) {
                continue;
            }
            if exclusion.from > current.from {
                result.push(Range::new(current.from, exclusion.from.prev_value()));
            }
            remaining = (exclusion.to < current.to).then(|| Range::new(exclusion.to.next_value(), current.to));
        }
        if let Some(current) = remaining {
            result.push(current);
        }
    }
    result
}

pub fn range_overlap<T: RangeValue>(a: &Range<T>, b: &Range<T>) -> bool {
    a.overlaps(b)
}

/// Intersection of every range of `ranges` with `bounds`, merged.
pub fn range_intersect_many<T: RangeValue>(ranges: &[Range<T>], bounds: &Range<T>) -> Vec<Range<T>> {
    let clipped: Vec<Range<T>> = ranges.iter().filter_map(|range| range.intersect(bounds)).collect();
    range_merge(&clipped)
}

/// Total number of steps covered by `ranges`, counting overlaps once.
pub fn range_total_len<T: RangeValue>(ranges: &[Range<T>]) -> u64 {
    range_merge(ranges).iter().map(Range::len).sum()
}

/// Cuts a range into consecutive chunks of at most `max_length` steps.
///
/// A `max_length` of 0 is treated as 1.
pub fn range_split_to_max_length<T: RangeValue>(range: &Range<T>, max_length: u64) -> Vec<Range<T>> {
    if !range.is_valid() {
        return Vec::new();
    }
    let step = max_length.max(1);
    let mut chunks = Vec::new();
    let mut from = range.from;
    loop {
        let to = from.advance(step - 1).min(range.to);
        chunks.push(Range::new(from, to));
        if to >= range.to {
            break;
        }
        from = to.next_value();
    }
    chunks
}

/// [`range_split_to_max_length`] applied to each range, preserving input order.
pub fn range_split_many_to_max_length<T: RangeValue>(ranges: &[Range<T>], max_length: u64) -> Vec<Range<T>> {
    ranges.iter().flat_map(|range| range_split_to_max_length(range, max_length)).collect()
}

/// Splits `ranges` into chunks of at most `max_length` and keeps `limit` of them,
/// taken from the most recent end for [`SortOrder::Desc`] or the oldest end for
/// [`SortOrder::Asc`]. The output is ordered the same way it was taken.
pub fn range_split_many_to_max_length_and_take_some<T: RangeValue>(
    ranges: &[Range<T>],
    max_length: u64,
    limit: usize,
    order: SortOrder,
) -> Vec<Range<T>> {
    let mut chunks = range_split_many_to_max_length(ranges, max_length);
    chunks.sort_by_key(|range| (range.from, range.to));
    if order == SortOrder::Desc {
        chunks.reverse();
    }
    chunks.truncate(limit);
    chunks
}

/// Ranges an entity should query next, split by priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictedRanges<T> {
    /// Never fetched, most recent first.
    pub new_ranges: Vec<Range<T>>,
    /// Failed before, most recent first, only filling room left by `new_ranges`.
    pub retry_ranges: Vec<Range<T>>,
}

impl<T: RangeValue> RestrictedRanges<T> {
    pub fn into_vec(self) -> Vec<Range<T>> {
        let mut ranges = self.new_ranges;
        ranges.extend(self.retry_ranges);
        ranges
    }
}

/// Splits the part of `full_range` left to fetch into chunks of at most `max_range_length`,
/// keeping at most `limit` chunks: new data first, most recent first, then retries.
///
/// Retry ranges are clipped to `full_range` but not checked against `covered_ranges`;
/// a range that failed stays eligible until a success removes it from the retry list.
pub fn restrict_ranges_with_import_state<T: RangeValue>(
    full_range: &Range<T>,
    covered_ranges: &[Range<T>],
    to_retry: &[Range<T>],
    max_range_length: u64,
    limit: usize,
) -> RestrictedRanges<T> {
    if !full_range.is_valid() {
        return RestrictedRanges { new_ranges: Vec::new(), retry_ranges: Vec::new() };
    }

    let retry = range_intersect_many(to_retry, full_range);
    let mut already_handled = covered_ranges.to_vec();
    already_handled.extend_from_slice(&retry);
    let uncovered = range_exclude(&[*full_range], &already_handled);

    let new_ranges = range_split_many_to_max_length_and_take_some(&uncovered, max_range_length, limit, SortOrder::Desc);
    let room = limit.saturating_sub(new_ranges.len());
    let retry_ranges = range_split_many_to_max_length_and_take_some(&retry, max_range_length, room, SortOrder::Desc);

    RestrictedRanges { new_ranges, retry_ranges }
}
