use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Mongo error: {0}")]
    MongoError(#[from] mongodb::error::Error),

    #[error("Failed to encode cache value for {key}: {source}")]
    EncodeError { key: String, source: serde_json::Error },
}
