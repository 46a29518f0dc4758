//! Collaborators that make the binary runnable on raw contract logs.

pub mod contract;
pub mod error_sink;
pub mod logs;

pub use contract::{ContractEntity, ContractFeed, FileEntitySource};
pub use error_sink::LoggingErrorSink;
pub use logs::RawLogsFetcher;
