use crate::sync::range::range_intersect_many;
use crate::types::range::{Range, RangeValue};

/// Per-entity input of the query optimizer, produced by the range normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerInput<E, T> {
    pub obj: E,
    pub full_range: Range<T>,
    pub covered_ranges: Vec<Range<T>>,
    pub to_retry: Vec<Range<T>>,
}

/// Sub-ranges of an address batch one entity actually needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter<T> {
    /// The whole batch range is needed.
    NoFilter,
    Ranges(Vec<Range<T>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityPostFilter<E, T> {
    pub obj: E,
    pub filter: PostFilter<T>,
}

/// One physical call covering many entities over one range.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressBatchQuery<E, T> {
    pub objs: Vec<E>,
    pub range: Range<T>,
    pub post_filters: Vec<EntityPostFilter<E, T>>,
}

/// One entity over one range; several of these can share a JSON-RPC batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleEntityQuery<E, T> {
    pub obj: E,
    pub range: Range<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query<E, T> {
    AddressBatch(AddressBatchQuery<E, T>),
    SingleEntity(SingleEntityQuery<E, T>),
}

impl<E, T: RangeValue> Query<E, T> {
    /// The range scanned by the physical call.
    pub fn range(&self) -> Range<T> {
        match self {
            Query::AddressBatch(query) => query.range,
            Query::SingleEntity(query) => query.range,
        }
    }

    /// Number of input objects the query costs in a batch.
    pub fn obj_count(&self) -> usize {
        match self {
            Query::AddressBatch(query) => query.objs.len(),
            Query::SingleEntity(_) => 1,
        }
    }

    /// Every entity served by this query with the ranges it receives from it.
    pub fn entity_ranges(&self) -> Vec<(&E, Vec<Range<T>>)> {
        match self {
            Query::SingleEntity(query) => vec![(&query.obj, vec![query.range])],
            Query::AddressBatch(query) => query
                .post_filters
                .iter()
                .map(|post_filter| {
                    let ranges = match &post_filter.filter {
                        PostFilter::NoFilter => vec![query.range],
                        PostFilter::Ranges(ranges) => range_intersect_many(ranges, &query.range),
                    };
                    (&post_filter.obj, ranges)
                })
                .collect(),
        }
    }
}

/// Result of fetching one range for one entity, waiting to be merged into its import state.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOutcome<T> {
    pub import_key: String,
    pub range: Range<T>,
    pub success: bool,
}

impl<T> RangeOutcome<T> {
    pub fn success(import_key: impl Into<String>, range: Range<T>) -> Self {
        Self { import_key: import_key.into(), range, success: true }
    }

    pub fn failure(import_key: impl Into<String>, range: Range<T>) -> Self {
        Self { import_key: import_key.into(), range, success: false }
    }
}
