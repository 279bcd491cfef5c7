//! Data sink abstraction
//!
//! The pipeline only needs one thing from a database: "bulk load the rows at this
//! location". This module defines that seam ([`DataSink`]), the statements used to
//! talk to SQL backends, and the formatting of query results for the CLI.
//!
//! - DuckDB: Embedded analytical database, in memory or persisted to a file
//! - Memory: Keeps loaded artifacts in memory

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pipeline::SpoolArtifact;

// Re-export implementations based on features
#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

pub mod memory;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBSink;

pub use memory::MemorySink;

/// Default table rows are loaded into
pub const DEFAULT_TABLE: &str = "data";

/// Default column delimiter of spooled rows
pub const DEFAULT_DELIMITER: char = ',';

/// Error type for sink operations
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Failed to start or connect to the database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Bulk load failed
    #[error("Load failed: {0}")]
    LoadFailed(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for finished spool artifacts
///
/// Implementations must accept loads of artifacts coming from different input
/// files one after another; the dispatcher never loads two artifacts at once.
#[async_trait(?Send)]
pub trait DataSink: Send + Sync {
    /// Bulk load the rows of `artifact`
    ///
    /// The artifact is only borrowed: the file at `artifact.location()` stays
    /// valid for the duration of the call and is cleaned up by the caller.
    async fn load(&self, artifact: &SpoolArtifact) -> SinkResult<()>;

    /// Check if the sink is reachable
    async fn health_check(&self) -> SinkResult<bool>;

    /// Get the sink type name
    fn backend_type(&self) -> &'static str;

    /// Release the sink
    async fn close(&self) -> SinkResult<()>;
}

/// Quote an SQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote an SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Statement that creates the target table from a column definition list
///
/// `format` is used verbatim, exactly like the inside of a `CREATE TABLE`.
pub fn create_table_statement(table: &str, format: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}({})",
        quote_identifier(table),
        format.trim()
    )
}

/// Statement that bulk loads one delimited spool file into `table`
pub fn load_statement(table: &str, location: &Path, delimiter: char) -> String {
    format!(
        "COPY {} FROM {} (FORMAT csv, DELIMITER {}, HEADER false)",
        quote_identifier(table),
        quote_literal(&location.to_string_lossy()),
        quote_literal(&delimiter.to_string())
    )
}

/// Query result row as a JSON value
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Create an empty result
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Format query results for display
pub fn format_query_result(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&result.rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_as_csv(result),
        OutputFormat::Table => format_as_table(result),
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn format_as_csv(result: &QueryResult) -> String {
    let mut output = result.columns.join(",");
    output.push('\n');

    for row in &result.rows {
        let values: Vec<String> = result
            .columns
            .iter()
            .map(|col| match row.get(col).unwrap_or(&serde_json::Value::Null) {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s)
                    if s.contains(',') || s.contains('"') || s.contains('\n') =>
                {
                    format!("\"{}\"", s.replace('"', "\"\""))
                }
                other => cell_text(other),
            })
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

fn format_as_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "OK".to_string();
    }
    if result.is_empty() {
        return "(0 rows)".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|col| cell_text(row.get(col).unwrap_or(&serde_json::Value::Null)))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let render = |values: &[String]| -> String {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:width$}", v, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut output = render(&result.columns);
    output.push('\n');
    output.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    output.push('\n');
    for row in &cells {
        output.push_str(&render(row));
        output.push('\n');
    }

    let noun = if result.row_count() == 1 { "row" } else { "rows" };
    output.push_str(&format!("({} {})", result.row_count(), noun));

    output
}
