pub mod constant;
pub mod error;
pub mod memory;
pub mod mongodb;

use crate::types::import_state::ImportState;
use async_trait::async_trait;
pub use error::DatabaseError;

/// Read-modify-write step applied to a locked import state row.
pub type ImportStateMerge<'a> = &'a (dyn Fn(ImportState) -> Result<ImportState, DatabaseError> + Send + Sync);

/// Persistence of per-entity import state.
///
/// Implementations must serialise `update_import_state_transactional` per key the way
/// a `SELECT ... FOR UPDATE` would: concurrent merges on one key never interleave.
#[async_trait]
pub trait ImportStateClient: Send + Sync {
    /// get_import_state - Get the import state of one entity
    async fn get_import_state(&self, import_key: &str) -> Result<Option<ImportState>, DatabaseError>;

    /// get_import_states - Get the import states of many entities, missing keys are skipped
    async fn get_import_states(&self, import_keys: &[String]) -> Result<Vec<ImportState>, DatabaseError>;

    /// upsert_import_state - Insert or fully replace an import state
    async fn upsert_import_state(&self, state: &ImportState) -> Result<(), DatabaseError>;

    /// create_import_state_if_missing - Insert unless a state exists, returns the stored state
    async fn create_import_state_if_missing(&self, state: ImportState) -> Result<ImportState, DatabaseError>;

    /// update_import_state_transactional - Lock the row, apply `merge` and write the result back
    async fn update_import_state_transactional(
        &self,
        import_key: &str,
        merge: ImportStateMerge<'_>,
    ) -> Result<ImportState, DatabaseError>;
}
