//! SQL command execution
//!
//! Runs the statements given with `--command` against the loaded database once
//! the pipeline has finished.

use std::io::Write;
use std::path::Path;

use tracing::error;

use crate::cli::error::CliError;
use crate::database::{DuckDBSink, OutputFormat, format_query_result};

/// Split a command string into statements on `;` outside of quotes
///
/// Single quoted literals and double quoted identifiers may contain `;`. A doubled
/// quote inside a quoted section is an escaped quote. Empty statements are dropped.
pub fn split_commands(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match (quote, c) {
            (None, ';') => {
                push_statement(&mut statements, &current);
                current.clear();
                continue;
            }
            (None, '\'' | '"') => quote = Some(c),
            // A doubled quote closes and reopens, which keeps the state consistent
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
        current.push(c);
    }
    push_statement(&mut statements, &current);

    statements
}

fn push_statement(statements: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

/// Statements named by a `--command` argument
///
/// An argument that names an existing file is read as a script, anything else is
/// taken as inline SQL.
pub fn resolve_commands(argument: &str) -> Result<Vec<String>, CliError> {
    let path = Path::new(argument);
    if path.is_file() {
        let script = std::fs::read_to_string(path)
            .map_err(|e| CliError::FileReadError(path.to_path_buf(), e.to_string()))?;
        Ok(split_commands(&script))
    } else {
        Ok(split_commands(argument))
    }
}

/// Execute `statements` in order, writing each result to `out`
///
/// A failing statement is logged and the remaining statements still run. Returns
/// the number of statements that failed.
pub async fn run_commands<W: Write>(
    sink: &DuckDBSink,
    statements: &[String],
    format: OutputFormat,
    out: &mut W,
) -> Result<usize, CliError> {
    let mut failed = 0;

    for sql in statements {
        match sink.execute_query(sql).await {
            Ok(result) => {
                writeln!(out, "{}", format_query_result(&result, format))
                    .map_err(|e| CliError::IoError(e.to_string()))?;

                // Timing only for formats meant for humans
                if format == OutputFormat::Table {
                    eprintln!("Execution time: {}ms", result.execution_time_ms);
                }
            }
            Err(e) => {
                error!(sql = %sql, error = %e, "command failed");
                failed += 1;
            }
        }
    }

    Ok(failed)
}
