// Client abstractions module - contains all client interface traits

pub mod cache;
pub mod database;
pub mod lock;
pub mod rpc;

// Re-export commonly used types
pub use cache::{memory::InMemoryCacheClient, mongodb::MongoCacheClient, CacheClient};
pub use database::{memory::InMemoryImportStateClient, mongodb::MongoDbClient, ImportStateClient};
pub use lock::{memory::InMemoryLockClient, mongodb::MongoLockClient, LockClient};
pub use rpc::JsonRpcClient;
