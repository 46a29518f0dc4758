use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value that can bound a [`Range`].
///
/// Ranges are inclusive on both ends, so every value type needs a notion of
/// "one step" to express adjacency and lengths. Block numbers step by one block,
/// timestamps step by one millisecond.
pub trait RangeValue: Copy + Ord + fmt::Debug + Send + Sync + 'static {
    /// The value one step after `self`, saturating at the maximum.
    fn next_value(self) -> Self;

    /// The value one step before `self`, saturating at the minimum.
    fn prev_value(self) -> Self;

    /// Number of steps in the inclusive interval `[from, to]`, 0 when inverted.
    fn span(from: Self, to: Self) -> u64;

    /// `self` moved forward by `steps`, saturating.
    fn advance(self, steps: u64) -> Self;
}

impl RangeValue for u64 {
    fn next_value(self) -> Self {
        self.saturating_add(1)
    }

    fn prev_value(self) -> Self {
        self.saturating_sub(1)
    }

    fn span(from: Self, to: Self) -> u64 {
        if from > to {
            0
        } else {
            (to - from).saturating_add(1)
        }
    }

    fn advance(self, steps: u64) -> Self {
        self.saturating_add(steps)
    }
}

impl RangeValue for DateTime<Utc> {
    fn next_value(self) -> Self {
        self.checked_add_signed(Duration::milliseconds(1)).unwrap_or(self)
    }

    fn prev_value(self) -> Self {
        self.checked_sub_signed(Duration::milliseconds(1)).unwrap_or(self)
    }

    fn span(from: Self, to: Self) -> u64 {
        if from > to {
            0
        } else {
            let millis = (to - from).num_milliseconds();
            u64::try_from(millis).unwrap_or(u64::MAX).saturating_add(1)
        }
    }

    fn advance(self, steps: u64) -> Self {
        let millis = i64::try_from(steps).unwrap_or(i64::MAX);
        self.checked_add_signed(Duration::milliseconds(millis)).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Inclusive interval `[from, to]`.
///
/// A range with `from > to` is invalid. Nothing rejects it on construction:
/// every range operation treats it as empty instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range<T> {
    pub from: T,
    pub to: T,
}

impl<T: RangeValue> Range<T> {
    pub fn new(from: T, to: T) -> Self {
        Self { from, to }
    }

    /// Single-value range `[value, value]`.
    pub fn point(value: T) -> Self {
        Self { from: value, to: value }
    }

    pub fn is_valid(&self) -> bool {
        self.from <= self.to
    }

    /// Number of steps covered by the range, 0 for invalid ranges.
    pub fn len(&self) -> u64 {
        T::span(self.from, self.to)
    }

    pub fn is_empty(&self) -> bool {
        !self.is_valid()
    }

    pub fn contains(&self, value: T) -> bool {
        self.from <= value && value <= self.to
    }

    pub fn overlaps(&self, other: &Range<T>) -> bool {
        self.is_valid() && other.is_valid() && self.from <= other.to && other.from <= self.to
    }

    pub fn intersect(&self, other: &Range<T>) -> Option<Range<T>> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Range { from: self.from.max(other.from), to: self.to.min(other.to) })
    }
}

impl<T: fmt::Debug> fmt::Debug for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:?}, {:?}}}", self.from, self.to)
    }
}

impl<T: fmt::Display> fmt::Display for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Which end of the value axis to favour when only some ranges can be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Most recent first.
    Desc,
}
