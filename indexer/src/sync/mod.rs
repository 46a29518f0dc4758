pub mod batch;
pub mod index;
pub mod normalizer;
pub mod optimizer;
pub mod range;
pub mod updater;
