use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Mongo error: {0}")]
    MongoError(#[from] mongodb::error::Error),

    #[error("Lock {key} is held by {owner}")]
    LockAlreadyHeld { key: String, owner: String },

    #[error("Timed out after {timeout_ms}ms waiting for lock {key}")]
    LockTimeout { key: String, timeout_ms: u64 },

    #[error("Lock {key} is not owned by {owner}")]
    NotOwner { key: String, owner: String },
}
