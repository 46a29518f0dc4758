use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::types::import_state::ImportData;

/// Something tracked with its own import state: a vault, a price feed.
///
/// The engine only needs a stable key, the address queried on chain and whether
/// the entity still changes; everything else stays opaque.
pub trait ImportEntity: Clone + Debug + Send + Sync + 'static {
    fn import_key(&self) -> String;

    fn address(&self) -> &str;

    /// `false` once the entity reached end of life and no new data is expected.
    fn is_live(&self) -> bool;

    /// Payload of the import state created the first time the entity is seen.
    fn initial_import_data(&self, now: DateTime<Utc>) -> ImportData;
}
