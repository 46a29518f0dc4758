use super::constant::{IMPORT_STATES_COLLECTION, MAX_TRANSACTION_ATTEMPTS};
use super::error::DatabaseError;
use super::{ImportStateClient, ImportStateMerge};
use crate::types::import_state::ImportState;
use crate::types::params::database::MongoConfig;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};
use mongodb::options::{ReplaceOptions, UpdateOptions};
use mongodb::{bson, Client, ClientSession, Collection, Database};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Import states are stored under `_id: importKey`; upserts take the `_id` from this filter.
pub fn import_key_filter(import_key: &str) -> Document {
    doc! { "_id": import_key }
}

pub trait ToDocument {
    fn to_document(&self) -> Result<Document, DatabaseError>;
}

impl<T: Serialize> ToDocument for T {
    fn to_document(&self) -> Result<Document, DatabaseError> {
        let doc = bson::to_bson(self)?;

        if let Bson::Document(doc) = doc {
            Ok(doc)
        } else {
            Err(DatabaseError::FailedToSerializeDocument(format!("Failed to serialize document: {}", doc)))
        }
    }
}

/// MongoDB client implementation
///
/// Transactional merges need a replica set (a single-node one is enough).
pub struct MongoDbClient {
    client: Client,
    database: Arc<Database>,
}

impl MongoDbClient {
    pub async fn new(config: &MongoConfig) -> Result<Self, DatabaseError> {
        let client = Client::with_uri_str(&config.connection_url).await?;
        let database = Arc::new(client.database(&config.database_name));
        Ok(Self { client, database })
    }

    /// Mongodb client uses Arc internally, reducing the cost of clone.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn database(&self) -> Arc<Database> {
        self.database.clone()
    }

    fn import_states(&self) -> Collection<ImportState> {
        self.database.collection(IMPORT_STATES_COLLECTION)
    }

    async fn merge_in_transaction(
        &self,
        session: &mut ClientSession,
        import_key: &str,
        merge: ImportStateMerge<'_>,
    ) -> Result<ImportState, DatabaseError> {
        let filter = import_key_filter(import_key);
        let current = self
            .import_states()
            .find_one_with_session(filter.clone(), None, session)
            .await?
            .ok_or_else(|| DatabaseError::ImportStateNotFound(import_key.to_string()))?;

        let updated = merge(current)?;
        self.import_states().replace_one_with_session(filter, &updated, None, session).await?;
        Ok(updated)
    }

    async fn commit_with_retry(session: &mut ClientSession) -> Result<(), DatabaseError> {
        loop {
            match session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(e) if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => {
                    warn!(error = %e, "Unknown commit result, retrying commit");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl ImportStateClient for MongoDbClient {
    #[tracing::instrument(skip(self), fields(function_type = "db_call"), err)]
    async fn get_import_state(&self, import_key: &str) -> Result<Option<ImportState>, DatabaseError> {
        Ok(self.import_states().find_one(import_key_filter(import_key), None).await?)
    }

    #[tracing::instrument(skip(self, import_keys), fields(function_type = "db_call", count = import_keys.len()), err)]
    async fn get_import_states(&self, import_keys: &[String]) -> Result<Vec<ImportState>, DatabaseError> {
        let start = Instant::now();
        let cursor = self.import_states().find(doc! { "_id": { "$in": import_keys } }, None).await?;
        let states: Vec<ImportState> = cursor.try_collect().await?;
        debug!(duration = %start.elapsed().as_millis(), found = states.len(), "Fetched import states");
        Ok(states)
    }

    #[tracing::instrument(skip(self, state), fields(function_type = "db_call", import_key = %state.import_key), err)]
    async fn upsert_import_state(&self, state: &ImportState) -> Result<(), DatabaseError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.import_states().replace_one(import_key_filter(&state.import_key), state, options).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, state), fields(function_type = "db_call", import_key = %state.import_key), err)]
    async fn create_import_state_if_missing(&self, state: ImportState) -> Result<ImportState, DatabaseError> {
        let options = UpdateOptions::builder().upsert(true).build();
        let filter = import_key_filter(&state.import_key);
        let updates = doc! {
            // only set when the document is inserted for the first time
            "$setOnInsert": state.to_document()?
        };
        let result = self.import_states().update_one(filter.clone(), updates, options).await?;
        if result.matched_count == 0 {
            debug!("Import state created");
            return Ok(state);
        }
        self.import_states()
            .find_one(filter, None)
            .await?
            .ok_or_else(|| DatabaseError::ImportStateNotFound(state.import_key.clone()))
    }

    #[tracing::instrument(skip(self, merge), fields(function_type = "db_call"), err)]
    async fn update_import_state_transactional(
        &self,
        import_key: &str,
        merge: ImportStateMerge<'_>,
    ) -> Result<ImportState, DatabaseError> {
        let mut session = self.client.start_session(None).await?;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            session.start_transaction(None).await?;
            let result = match self.merge_in_transaction(&mut session, import_key, merge).await {
                Ok(updated) => Self::commit_with_retry(&mut session).await.map(|_| updated),
                Err(e) => {
                    session.abort_transaction().await.ok();
                    Err(e)
                }
            };

            match result {
                Ok(updated) => return Ok(updated),
                Err(DatabaseError::MongoError(e)) if e.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                    warn!(attempt, error = %e, "Transient transaction error, retrying merge");
                }
                Err(e) => return Err(e),
            }
        }

        Err(DatabaseError::TransactionAborted { import_key: import_key.to_string(), attempts: MAX_TRANSACTION_ATTEMPTS })
    }
}
