pub const LOCKS_COLLECTION: &str = "locks";
pub const RPC_LAST_CALLS_COLLECTION: &str = "rpc_last_calls";

/// Interval between two attempts while waiting for a busy lock.
pub const LOCK_POLL_INTERVAL_MS: u64 = 50;
/// MongoDB duplicate key error code, raised when an upsert races a live lock.
pub const DUPLICATE_KEY_ERROR_CODE: i32 = 11000;
