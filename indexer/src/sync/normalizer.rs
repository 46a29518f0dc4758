//! Turns an entity's import state into the optimizer input of the current pass.

use tracing::{error, warn};

use crate::error::ConfigError;
use crate::sync::range::range_intersect_many;
use crate::types::entity::ImportEntity;
use crate::types::import_state::ImportState;
use crate::types::params::{ImportBehaviour, ImportMode};
use crate::types::query::OptimizerInput;
use crate::types::range::Range;

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1_000;

/// Chain-wide inputs shared by every entity of a pass.
#[derive(Debug, Clone)]
pub struct NormalizerContext<'a> {
    pub behaviour: &'a ImportBehaviour,
    pub latest_block_number: u64,
    pub max_blocks_per_query: u64,
    pub ms_per_block_estimate: u64,
}

/// The newest blocks worth querying, shifted away from the tip by `wait_for_block_propagation`.
///
/// Spans at most `max_blocks_per_query`, about one day of blocks, and the distance
/// to the last block imported in this process when known.
pub fn recent_window(ctx: &NormalizerContext<'_>, last_imported_block_number: Option<u64>) -> Range<u64> {
    let one_day_of_blocks = MS_PER_DAY / ctx.ms_per_block_estimate.max(1);
    let mut length = ctx.max_blocks_per_query.min(one_day_of_blocks);
    if let Some(last_imported) = last_imported_block_number {
        length = length.min(ctx.latest_block_number.saturating_sub(last_imported));
    }
    let wait = ctx.behaviour.wait_for_block_propagation;
    Range::new(
        ctx.latest_block_number.saturating_sub(length).saturating_sub(wait),
        ctx.latest_block_number.saturating_sub(wait),
    )
}

/// Computes the full range to consider for `obj` and the ranges to subtract from it.
///
/// An inverted full range is reported and replaced by a point range so the pass still
/// refreshes `lastImportDate`; in strict mode it is an error instead.
pub fn import_state_to_optimizer_range_input<E: ImportEntity>(
    obj: E,
    ctx: &NormalizerContext<'_>,
    last_imported_block_number: Option<u64>,
    import_state: Option<&ImportState>,
) -> Result<OptimizerInput<E, u64>, ConfigError> {
    let behaviour = ctx.behaviour;
    let import_key = obj.import_key();
    let window = recent_window(ctx, last_imported_block_number);

    let mut full_range = match (behaviour.mode, import_state) {
        (ImportMode::Recent, _) | (_, None) => window,
        (ImportMode::Historical, Some(state)) => {
            let product = state
                .import_data
                .product()
                .ok_or_else(|| ConfigError::RangeKindMismatch { import_key: import_key.clone(), expected: "block" })?;
            let mut to = ctx.latest_block_number.saturating_sub(behaviour.wait_for_block_propagation);
            if behaviour.skip_recent_window_when_historical.applies_to(obj.is_live()) {
                // the recent pipeline owns the window, stop right before it
                to = to.min(window.from.saturating_sub(1));
            }
            Range::new(product.contract_created_at_block, to)
        }
    };

    if !full_range.is_valid() {
        let details = format!("full range {} is inverted", full_range);
        if behaviour.strict {
            error!(import_key = %import_key, range = %full_range, "Inconsistent full range");
            return Err(ConfigError::InconsistentRange { import_key, details });
        }
        warn!(import_key = %import_key, range = %full_range, "Inverted full range, using a point range instead");
        full_range = Range::point(full_range.to);
    }

    let (covered_ranges, mut to_retry) = match import_state.and_then(|state| state.ranges::<u64>()) {
        Some(ranges) if !behaviour.ignore_import_state => (ranges.covered_ranges.clone(), ranges.to_retry.clone()),
        _ => (Vec::new(), Vec::new()),
    };
    if behaviour.mode != ImportMode::Historical {
        to_retry.clear();
    }

    if let Some(forced) = behaviour.force_considered_block_range {
        // an empty intersection leaves an inverted range, which yields no query downstream
        full_range = Range::new(full_range.from.max(forced.from), full_range.to.min(forced.to));
        to_retry = range_intersect_many(&to_retry, &full_range);
    }

    Ok(OptimizerInput { obj, full_range, covered_ranges, to_retry })
}
