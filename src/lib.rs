//! textsql - load text files into an embedded SQL database
//!
//! Provides:
//! - Row extraction from lines with a regular expression and a template
//! - A concurrent pipeline: one reader/transformer pair per file, spooled rows
//!   loaded by a single dispatcher as soon as each file is done
//! - Data sinks (DuckDB, in-memory)
//! - `.textsql.toml` configuration with environment overrides

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod database;
pub mod extract;
pub mod pipeline;

// Re-export commonly used types
pub use config::{ConfigError, TextSqlConfig};
#[cfg(feature = "duckdb-backend")]
pub use database::DuckDBSink;
pub use database::{DataSink, MemorySink, SinkError, SinkResult};
pub use extract::{ExtractError, ExtractionRule, TabularRow};
pub use pipeline::{
    InputSpec, Pipeline, PipelineError, PipelineEvent, PipelineOptions, PipelineReport, Stage,
    Telemetry, TracingTelemetry,
};
