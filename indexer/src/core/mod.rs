pub mod client;
pub mod config;

pub use client::{CacheClient, ImportStateClient, LockClient};
