pub mod common;
pub mod database;
pub mod rpc;
pub mod workers;
