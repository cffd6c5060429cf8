pub mod extract;
pub mod query;
pub mod time_serde;
pub mod types;
