use mongodb::bson;
use thiserror::Error;

use crate::error::ConfigError;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Mongo error: {0}")]
    MongoError(#[from] mongodb::error::Error),

    #[error("BSON serialization error: {0}")]
    BsonSerError(#[from] bson::ser::Error),

    #[error("BSON deserialization error: {0}")]
    BsonDeError(#[from] bson::de::Error),

    #[error("Failed to serialize document: {0}")]
    FailedToSerializeDocument(String),

    #[error("Import state not found: {0}")]
    ImportStateNotFound(String),

    #[error("Import state merge rejected: {0}")]
    MergeRejected(#[from] ConfigError),

    #[error("Transaction on {import_key} aborted after {attempts} attempts")]
    TransactionAborted { import_key: String, attempts: u32 },
}
