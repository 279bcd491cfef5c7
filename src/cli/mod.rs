//! Command line support for the `textsql` binary

pub mod commands;
pub mod error;
pub mod logging;

pub use error::CliError;
pub use logging::{LogLevel, init_logging};
