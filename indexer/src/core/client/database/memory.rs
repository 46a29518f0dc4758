use super::error::DatabaseError;
use super::{ImportStateClient, ImportStateMerge};
use crate::types::import_state::ImportState;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Import state store kept in process memory.
///
/// The single mutex serialises every merge, which gives the same per-key guarantee
/// as a row lock.
#[derive(Default)]
pub struct InMemoryImportStateClient {
    states: Mutex<HashMap<String, ImportState>>,
}

impl InMemoryImportStateClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImportStateClient for InMemoryImportStateClient {
    async fn get_import_state(&self, import_key: &str) -> Result<Option<ImportState>, DatabaseError> {
        Ok(self.states.lock().await.get(import_key).cloned())
    }

    async fn get_import_states(&self, import_keys: &[String]) -> Result<Vec<ImportState>, DatabaseError> {
        let states = self.states.lock().await;
        Ok(import_keys.iter().filter_map(|key| states.get(key).cloned()).collect())
    }

    async fn upsert_import_state(&self, state: &ImportState) -> Result<(), DatabaseError> {
        self.states.lock().await.insert(state.import_key.clone(), state.clone());
        Ok(())
    }

    async fn create_import_state_if_missing(&self, state: ImportState) -> Result<ImportState, DatabaseError> {
        let mut states = self.states.lock().await;
        Ok(states.entry(state.import_key.clone()).or_insert(state).clone())
    }

    async fn update_import_state_transactional(
        &self,
        import_key: &str,
        merge: ImportStateMerge<'_>,
    ) -> Result<ImportState, DatabaseError> {
        let mut states = self.states.lock().await;
        let current =
            states.get(import_key).cloned().ok_or_else(|| DatabaseError::ImportStateNotFound(import_key.to_string()))?;
        // a rejected merge leaves the stored state untouched
        let updated = merge(current)?;
        states.insert(import_key.to_string(), updated.clone());
        Ok(updated)
    }
}
