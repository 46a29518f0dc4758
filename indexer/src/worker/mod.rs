pub mod chain_runner;
pub mod chain_worker;
pub mod executor;
pub mod traits;
pub mod weights;

pub use chain_runner::ChainRunner;
pub use chain_worker::ChainWorker;
pub use executor::RateLimitedExecutor;
pub use traits::{EntitySource, ErrorReport, ErrorSink, QueryFetcher};
