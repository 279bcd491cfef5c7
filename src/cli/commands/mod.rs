//! CLI command implementations

pub mod load;
pub mod query;

pub use load::{LoadArgs, LoadSummary, handle_load};
