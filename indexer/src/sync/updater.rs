//! Merges fetch outcomes back into persisted import state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::core::client::database::{DatabaseError, ImportStateClient};
use crate::error::ConfigError;
use crate::sync::range::{range_exclude, range_merge};
use crate::types::import_state::{ImportRangeKind, ImportRanges, ImportState};
use crate::types::query::RangeOutcome;
use crate::types::range::{Range, RangeValue};

/// New coverage after a set of outcomes.
///
/// Successes join `covered_ranges` and leave `to_retry`; failures join `to_retry`.
/// A range reported both ways in the same set counts as covered and retried.
pub fn update_import_ranges<T: RangeValue>(
    ranges: &ImportRanges<T>,
    outcomes: &[(Range<T>, bool)],
    now: DateTime<Utc>,
) -> ImportRanges<T> {
    let success: Vec<Range<T>> = outcomes.iter().filter(|(_, success)| *success).map(|(range, _)| *range).collect();
    let errors: Vec<Range<T>> = outcomes.iter().filter(|(_, success)| !*success).map(|(range, _)| *range).collect();
    let success = range_merge(&success);

    let mut covered = ranges.covered_ranges.clone();
    covered.extend_from_slice(&success);

    let mut to_retry = range_exclude(&ranges.to_retry, &success);
    to_retry.extend(range_merge(&errors));

    ImportRanges { covered_ranges: range_merge(&covered), to_retry: range_merge(&to_retry), last_import_date: now }
}

/// Applies outcomes to the ranges `T` of `state`.
pub fn apply_outcomes<T: ImportRangeKind>(
    mut state: ImportState,
    outcomes: &[RangeOutcome<T>],
    now: DateTime<Utc>,
) -> Result<ImportState, ConfigError> {
    let import_key = state.import_key.clone();
    let ranges = state
        .ranges_mut::<T>()
        .ok_or(ConfigError::RangeKindMismatch { import_key: import_key.clone(), expected: T::NAME })?;
    let pairs: Vec<(Range<T>, bool)> = outcomes
        .iter()
        .filter(|outcome| outcome.import_key == import_key)
        .map(|outcome| (outcome.range, outcome.success))
        .collect();
    *ranges = update_import_ranges(ranges, &pairs, now);
    Ok(state)
}

/// Buffers outcomes per import key and persists them in one transaction per flush.
///
/// A flush happens when the incoming key changes, when `max_buffer` outcomes are
/// waiting, or `max_wait` after the first buffered outcome.
pub struct ImportStateUpdater {
    store: Arc<dyn ImportStateClient>,
    max_buffer: usize,
    max_wait: Duration,
}

impl ImportStateUpdater {
    pub fn new(store: Arc<dyn ImportStateClient>, max_buffer: usize, max_wait: Duration) -> Self {
        Self { store, max_buffer: max_buffer.max(1), max_wait }
    }

    /// Consumes outcomes until every sender is dropped, then flushes what is left.
    pub async fn run<T: ImportRangeKind>(self, mut outcomes: mpsc::Receiver<RangeOutcome<T>>) {
        let mut buffer: Vec<RangeOutcome<T>> = Vec::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                Some(deadline_at) => match tokio::time::timeout_at(deadline_at, outcomes.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.flush(&mut buffer).await;
                        deadline = None;
                        continue;
                    }
                },
                None => outcomes.recv().await,
            };

            let Some(outcome) = next else {
                self.flush(&mut buffer).await;
                break;
            };

            if buffer.last().is_some_and(|last| last.import_key != outcome.import_key) {
                self.flush(&mut buffer).await;
            }
            if buffer.is_empty() {
                deadline = Some(Instant::now() + self.max_wait);
            }
            buffer.push(outcome);
            if buffer.len() >= self.max_buffer {
                self.flush(&mut buffer).await;
                deadline = None;
            }
        }
        debug!("Import state updater stopped");
    }

    async fn flush<T: ImportRangeKind>(&self, buffer: &mut Vec<RangeOutcome<T>>) {
        let Some(first) = buffer.first() else {
            return;
        };
        let import_key = first.import_key.clone();
        let outcomes = std::mem::take(buffer);

        let merge = |state: ImportState| -> Result<ImportState, DatabaseError> {
            apply_outcomes(state, &outcomes, Utc::now()).map_err(DatabaseError::from)
        };
        match self.store.update_import_state_transactional(&import_key, &merge).await {
            Ok(state) => {
                debug!(import_key = %import_key, outcomes = outcomes.len(), "Import state updated");
                if let Some(ranges) = state.ranges::<T>() {
                    debug!(covered = ?ranges.covered_ranges, to_retry = ?ranges.to_retry, "Coverage after merge");
                }
            }
            Err(DatabaseError::MergeRejected(e)) => {
                error!(import_key = %import_key, error = %e, "Import state merge rejected");
            }
            Err(e) => {
                // the ranges stay missing and come back on the next pass
                error!(import_key = %import_key, error = %e, "Failed to update import state");
            }
        }
    }
}
