use super::{CacheClient, CacheError};
use crate::utils::time::saturating_add;
use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{doc, Document};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{bson, Collection, Database, IndexModel};
use std::sync::Arc;
use std::time::Duration;

pub const CACHE_COLLECTION: &str = "cache";

/// Cache entries stored as `{ _id, value, expires_at }`.
///
/// Reads filter on `expires_at`, the TTL index only reclaims space.
pub struct MongoCacheClient {
    database: Arc<Database>,
}

impl MongoCacheClient {
    pub async fn new(database: Arc<Database>) -> Result<Self, CacheError> {
        let client = Self { database };
        let index = IndexModel::builder()
            .keys(doc! { "expires_at": 1 })
            .options(IndexOptions::builder().expire_after(Duration::from_secs(0)).build())
            .build();
        client.entries().create_index(index, None).await?;
        Ok(client)
    }

    fn entries(&self) -> Collection<Document> {
        self.database.collection(CACHE_COLLECTION)
    }
}

#[async_trait]
impl CacheClient for MongoCacheClient {
    #[tracing::instrument(skip(self), fields(function_type = "db_call"), err)]
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let filter = doc! { "_id": key, "expires_at": { "$gt": bson::DateTime::from_chrono(Utc::now()) } };
        let entry = self.entries().find_one(filter, None).await?;
        Ok(entry.and_then(|doc| doc.get_str("value").ok().map(str::to_string)))
    }

    #[tracing::instrument(skip(self, value), fields(function_type = "db_call"), err)]
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = saturating_add(Utc::now(), ttl);
        let update = doc! { "$set": { "value": value, "expires_at": bson::DateTime::from_chrono(expires_at) } };
        let options = UpdateOptions::builder().upsert(true).build();
        self.entries().update_one(doc! { "_id": key }, update, options).await?;
        Ok(())
    }
}
