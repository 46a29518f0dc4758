pub mod entity;
pub mod import_state;
pub mod limitations;
pub mod params;
pub mod query;
pub mod range;
