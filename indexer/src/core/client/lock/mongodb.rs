use super::constant::{DUPLICATE_KEY_ERROR_CODE, LOCKS_COLLECTION, RPC_LAST_CALLS_COLLECTION};
use super::{LockClient, LockError, LockResult};
use crate::utils::time::saturating_add;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::UpdateOptions;
use mongodb::{bson, Collection, Database};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Lock client storing locks and last-call times in MongoDB
///
/// Locks live in one document per key: `{ _id, owner, expires_at }`.
pub struct MongoLockClient {
    database: Arc<Database>,
}

impl MongoLockClient {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    fn locks(&self) -> Collection<Document> {
        self.database.collection(LOCKS_COLLECTION)
    }

    fn last_calls(&self) -> Collection<Document> {
        self.database.collection(RPC_LAST_CALLS_COLLECTION)
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY_ERROR_CODE
    )
}

fn bson_now() -> bson::DateTime {
    bson::DateTime::from_chrono(Utc::now())
}

#[async_trait]
impl LockClient for MongoLockClient {
    #[tracing::instrument(skip(self), fields(function_type = "db_call"), err)]
    async fn acquire_lock(&self, key: &str, owner: &str, expiry_seconds: u64) -> Result<LockResult, LockError> {
        let now = Utc::now();
        let expires_at = saturating_add(now, Duration::from_secs(expiry_seconds));
        // matches a free slot: an expired lock or one we already own
        let filter = doc! {
            "_id": key,
            "$or": [
                { "expires_at": { "$lt": bson::DateTime::from_chrono(now) } },
                { "owner": owner },
            ]
        };
        let update = doc! { "$set": { "owner": owner, "expires_at": bson::DateTime::from_chrono(expires_at) } };
        let options = UpdateOptions::builder().upsert(true).build();

        match self.locks().update_one(filter, update, options).await {
            Ok(_) => {
                trace!(key, owner, "Lock acquired");
                Ok(LockResult::Acquired)
            }
            // the upsert collided with a live lock held by someone else
            Err(e) if is_duplicate_key(&e) => {
                let current = self.get_lock_owner(key).await?.unwrap_or_default();
                Ok(LockResult::AlreadyHeld(current))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self), fields(function_type = "db_call"), err)]
    async fn release_lock(&self, key: &str, owner: &str) -> Result<LockResult, LockError> {
        let result = self.locks().delete_one(doc! { "_id": key, "owner": owner }, None).await?;
        if result.deleted_count == 1 {
            return Ok(LockResult::Released);
        }
        match self.get_lock_owner(key).await? {
            Some(current) => Err(LockError::NotOwner { key: key.to_string(), owner: current }),
            None => Ok(LockResult::NotFound),
        }
    }

    async fn get_lock_owner(&self, key: &str) -> Result<Option<String>, LockError> {
        let filter = doc! { "_id": key, "expires_at": { "$gt": bson_now() } };
        let lock = self.locks().find_one(filter, None).await?;
        Ok(lock.and_then(|doc| doc.get_str("owner").ok().map(str::to_string)))
    }

    async fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.get_lock_owner(key).await?.is_some())
    }

    async fn get_last_call(&self, key: &str) -> Result<Option<DateTime<Utc>>, LockError> {
        let record = self.last_calls().find_one(doc! { "_id": key }, None).await?;
        Ok(record.and_then(|doc| doc.get_datetime("last_call_at").ok().map(|at| at.to_chrono())))
    }

    async fn record_call(&self, key: &str, at: DateTime<Utc>) -> Result<(), LockError> {
        let options = UpdateOptions::builder().upsert(true).build();
        let update = doc! { "$max": { "last_call_at": bson::DateTime::from_chrono(at) } };
        self.last_calls().update_one(doc! { "_id": key }, update, options).await?;
        Ok(())
    }
}
