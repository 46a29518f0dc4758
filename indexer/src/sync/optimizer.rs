//! Groups many entities' missing ranges into few batched queries.

use std::collections::HashMap;
use tracing::debug;

use crate::sync::index::RangeIndexBuilder;
use crate::sync::range::{
    range_intersect_many, range_merge, range_split_many_to_max_length,
    range_split_many_to_max_length_and_take_some, range_total_len, restrict_ranges_with_import_state,
};
use crate::types::limitations::RpcLimitations;
use crate::types::params::OptimizerDefaults;
use crate::types::query::{AddressBatchQuery, EntityPostFilter, OptimizerInput, PostFilter, Query, SingleEntityQuery};
use crate::types::range::{Range, RangeValue, SortOrder};

/// Caps applied to every emitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerOptions {
    pub max_addresses_per_query: usize,
    pub max_range_size: u64,
    pub max_queries_per_product: usize,
}

impl OptimizerOptions {
    pub fn from_defaults(defaults: &OptimizerDefaults) -> Self {
        Self {
            max_addresses_per_query: defaults.max_addresses_per_query,
            max_range_size: defaults.max_blocks_per_query,
            max_queries_per_product: defaults.max_queries_per_product,
        }
    }

    /// Tightens the caps to what `eth_getLogs` accepts on a provider.
    pub fn constrained_by(mut self, limitations: &RpcLimitations) -> Self {
        if let Some(max_addresses) = limitations.max_get_logs_address_batch_size {
            self.max_addresses_per_query = self.max_addresses_per_query.min(max_addresses);
        }
        if let Some(max_span) = limitations.max_get_logs_block_span {
            self.max_range_size = self.max_range_size.min(max_span);
        }
        self.max_addresses_per_query = self.max_addresses_per_query.max(1);
        self.max_range_size = self.max_range_size.max(1);
        self
    }
}

struct EntityNeeds<T> {
    input_index: usize,
    new_ranges: Vec<Range<T>>,
    retry_ranges: Vec<Range<T>>,
}

/// Produces the queries covering every entity's missing data, most recent first.
///
/// New data is served before retries and each entity gets at most
/// `max_queries_per_product` queries; what does not fit is left for a later pass.
/// Inputs with an inverted full range produce nothing.
pub fn optimize_queries<E: Clone, T: RangeValue>(
    inputs: &[OptimizerInput<E, T>],
    options: &OptimizerOptions,
    index: &dyn RangeIndexBuilder<T>,
) -> Vec<Query<E, T>> {
    let max_range_size = options.max_range_size.max(1);
    let max_addresses = options.max_addresses_per_query.max(1);
    let cap = options.max_queries_per_product;

    let needs: Vec<EntityNeeds<T>> = inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| input.full_range.is_valid())
        .map(|(input_index, input)| {
            let restricted = restrict_ranges_with_import_state(
                &input.full_range,
                &input.covered_ranges,
                &input.to_retry,
                max_range_size,
                cap,
            );
            EntityNeeds {
                input_index,
                new_ranges: range_merge(&restricted.new_ranges),
                retry_ranges: range_intersect_many(&input.to_retry, &input.full_range),
            }
        })
        .collect();

    let slices = build_ordered_slices(&needs, max_range_size, index);
    let mut query_count: HashMap<usize, usize> = HashMap::new();
    let mut queries = Vec::new();

    for slice in &slices {
        let members: Vec<(usize, Vec<Range<T>>)> = needs
            .iter()
            .filter(|need| query_count.get(&need.input_index).copied().unwrap_or(0) < cap)
            .filter_map(|need| {
                let parts = range_intersect_many(&need.new_ranges, slice);
                (!parts.is_empty()).then_some((need.input_index, parts))
            })
            .collect();

        for group in members.chunks(max_addresses) {
            if let Some(range) = cheaper_batch_range(group) {
                queries.push(address_batch(inputs, group, range));
                for (input_index, _) in group {
                    *query_count.entry(*input_index).or_default() += 1;
                }
                continue;
            }
            for (input_index, parts) in group {
                let count = query_count.entry(*input_index).or_default();
                for part in parts.iter().rev().take(cap.saturating_sub(*count)) {
                    let obj = inputs[*input_index].obj.clone();
                    queries.push(Query::SingleEntity(SingleEntityQuery { obj, range: *part }));
                    *count += 1;
                }
            }
        }
    }

    // retries only ever use the room new data left
    for need in &needs {
        let room = cap.saturating_sub(query_count.get(&need.input_index).copied().unwrap_or(0));
        let retries =
            range_split_many_to_max_length_and_take_some(&need.retry_ranges, max_range_size, room, SortOrder::Desc);
        for range in retries {
            let obj = inputs[need.input_index].obj.clone();
            queries.push(Query::SingleEntity(SingleEntityQuery { obj, range }));
        }
    }

    debug!(entities = inputs.len(), slices = slices.len(), queries = queries.len(), "Optimized queries");
    queries
}

/// Slices from the index builder that hold missing values, capped to `max_range_size` and
/// ordered most recent first.
///
/// Values outside every slice are not queried in this pass.
fn build_ordered_slices<T: RangeValue>(
    needs: &[EntityNeeds<T>],
    max_range_size: u64,
    index: &dyn RangeIndexBuilder<T>,
) -> Vec<Range<T>> {
    let needed: Vec<Range<T>> = needs.iter().flat_map(|need| need.new_ranges.iter().copied()).collect();
    let all_needed = range_merge(&needed);
    if all_needed.is_empty() {
        return Vec::new();
    }

    let mut slices = range_split_many_to_max_length(&index.build_slices(&all_needed), max_range_size);
    slices.retain(|slice| all_needed.iter().any(|needed| needed.overlaps(slice)));
    slices.sort_by_key(|slice| std::cmp::Reverse(slice.from));
    slices
}

/// Range of an address batch for `group`, when one scan over the hull of every part
/// costs no more than one scan per part.
fn cheaper_batch_range<T: RangeValue>(group: &[(usize, Vec<Range<T>>)]) -> Option<Range<T>> {
    if group.len() < 2 {
        return None;
    }
    let all_parts: Vec<Range<T>> = group.iter().flat_map(|(_, parts)| parts.iter().copied()).collect();
    let hull = hull(&all_parts)?;
    let separate_cost: u64 = group.iter().map(|(_, parts)| range_total_len(parts)).sum();
    (hull.len() <= separate_cost).then_some(hull)
}

fn hull<T: RangeValue>(ranges: &[Range<T>]) -> Option<Range<T>> {
    let from = ranges.iter().map(|range| range.from).min()?;
    let to = ranges.iter().map(|range| range.to).max()?;
    Some(Range::new(from, to))
}

fn address_batch<E: Clone, T: RangeValue>(
    inputs: &[OptimizerInput<E, T>],
    group: &[(usize, Vec<Range<T>>)],
    range: Range<T>,
) -> Query<E, T> {
    let post_filters = group
        .iter()
        .map(|(input_index, parts)| {
            let filter = if parts.as_slice() == [range] { PostFilter::NoFilter } else { PostFilter::Ranges(parts.clone()) };
            EntityPostFilter { obj: inputs[*input_index].obj.clone(), filter }
        })
        .collect();
    Query::AddressBatch(AddressBatchQuery {
        objs: group.iter().map(|(input_index, _)| inputs[*input_index].obj.clone()).collect(),
        range,
        post_filters,
    })
}
