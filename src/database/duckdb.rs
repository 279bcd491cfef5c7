//! DuckDB sink
//!
//! Embeds DuckDB in-process. Spool artifacts are bulk loaded with `COPY`, and the
//! same connection answers the queries run after the pipeline finished.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{
    DEFAULT_DELIMITER, DEFAULT_TABLE, DataSink, QueryResult, SinkError, SinkResult,
    create_table_statement, load_statement,
};
use crate::pipeline::SpoolArtifact;

/// DuckDB sink
///
/// Loads rows into a single target table. Supports both file-based persistence and
/// in-memory mode.
pub struct DuckDBSink {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// Table spool artifacts are loaded into
    table: String,
    /// Column delimiter of spooled rows
    delimiter: char,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDBSink {
    /// Open (or create) a persisted database file
    pub fn open(db_path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path)
            .map_err(|e| SinkError::ConnectionFailed(format!("Failed to open DuckDB: {}", e)))?;

        Ok(Self::with_connection(Some(path), connection))
    }

    /// Create an in-memory database that is gone when the sink is dropped
    pub fn in_memory() -> SinkResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            SinkError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self::with_connection(None, connection))
    }

    fn with_connection(db_path: Option<PathBuf>, connection: duckdb::Connection) -> Self {
        Self {
            db_path,
            table: DEFAULT_TABLE.to_string(),
            delimiter: DEFAULT_DELIMITER,
            connection: Mutex::new(connection),
        }
    }

    /// Load into `table` instead of the default table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Expect `delimiter` between the columns of a row
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    /// Name of the target table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column delimiter of loaded rows
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    fn lock(&self) -> SinkResult<MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| SinkError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Create the target table from a column definition list, e.g.
    /// `day DATE, category VARCHAR, n INTEGER`
    pub fn create_table(&self, format: &str) -> SinkResult<()> {
        if format.trim().is_empty() {
            return Err(SinkError::InvalidInput(
                "table format must define at least one column".to_string(),
            ));
        }
        let sql = create_table_statement(&self.table, format);
        debug!(sql = %sql, "creating table");
        self.execute_batch(&sql)
    }

    /// Execute a SQL statement that doesn't return rows
    pub fn execute(&self, sql: &str) -> SinkResult<usize> {
        let conn = self.lock()?;
        conn.execute(sql, [])
            .map_err(|e| SinkError::QueryFailed(format!("Execute failed: {}", e)))
    }

    /// Execute multiple SQL statements
    pub fn execute_batch(&self, sql: &str) -> SinkResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| SinkError::QueryFailed(format!("Batch execute failed: {}", e)))
    }

    /// Run a query and collect its rows as JSON objects
    pub async fn execute_query(&self, sql: &str) -> SinkResult<QueryResult> {
        let start = std::time::Instant::now();

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| SinkError::QueryFailed(format!("Prepare failed: {}", e)))?;

        // Columns are only known once the statement ran
        let mut result_rows = stmt
            .query([])
            .map_err(|e| SinkError::QueryFailed(format!("Query failed: {}", e)))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| SinkError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            rows.push(Self::row_to_json(row, &columns));
        }

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn row_to_json(row: &duckdb::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (i, col_name) in columns.iter().enumerate() {
            let value = match row.get_ref(i) {
                Ok(value_ref) => value_to_json(Value::from(value_ref)),
                Err(_) => serde_json::Value::Null,
            };
            map.insert(col_name.clone(), value);
        }
        serde_json::Value::Object(map)
    }
}

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Convert a DuckDB value to JSON
///
/// Temporal values become ISO 8601 text, the way DuckDB prints them.
fn value_to_json(value: Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(b),
        Value::TinyInt(i) => Json::Number(i.into()),
        Value::SmallInt(i) => Json::Number(i.into()),
        Value::Int(i) => Json::Number(i.into()),
        Value::BigInt(i) => Json::Number(i.into()),
        // i128 does not fit a JSON number
        Value::HugeInt(i) => Json::String(i.to_string()),
        Value::UTinyInt(i) => Json::Number(i.into()),
        Value::USmallInt(i) => Json::Number(i.into()),
        Value::UInt(i) => Json::Number(i.into()),
        Value::UBigInt(i) => Json::Number(i.into()),
        Value::Float(f) => serde_json::Number::from_f64(f as f64)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Double(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Decimal(d) => Json::String(d.to_string()),
        Value::Text(s) => Json::String(s),
        Value::Enum(s) => Json::String(s),
        Value::Blob(bytes) => {
            use base64::Engine;
            Json::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        Value::Date32(days) => Json::String(date_text(days).unwrap_or_else(|| days.to_string())),
        Value::Timestamp(unit, v) => {
            Json::String(timestamp_text(unit, v).unwrap_or_else(|| v.to_string()))
        }
        Value::Time64(unit, v) => Json::String(time_text(unit, v).unwrap_or_else(|| v.to_string())),
        Value::Interval {
            months,
            days,
            nanos,
        } => Json::String(interval_text(months, days, nanos)),
        Value::List(items) | Value::Array(items) => {
            Json::Array(items.into_iter().map(value_to_json).collect())
        }
        Value::Union(inner) => value_to_json(*inner),
        other => Json::String(format!("{:?}", other)),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn date_text(days: i32) -> Option<String> {
    let date = NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn timestamp_text(unit: TimeUnit, value: i64) -> Option<String> {
    let micros = to_micros(unit, value);
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    let ts = DateTime::from_timestamp(micros.div_euclid(1_000_000), nanos)?;
    Some(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
}

fn time_text(unit: TimeUnit, value: i64) -> Option<String> {
    let micros = to_micros(unit, value);
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)?;
    Some(time.format("%H:%M:%S%.f").to_string())
}

fn interval_text(months: i32, days: i32, nanos: i64) -> String {
    fn unit(n: i64, name: &str) -> String {
        if n.abs() == 1 {
            format!("{} {}", n, name)
        } else {
            format!("{} {}s", n, name)
        }
    }

    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        parts.push(unit(years as i64, "year"));
    }
    if months != 0 {
        parts.push(unit(months as i64, "month"));
    }
    if days != 0 {
        parts.push(unit(days as i64, "day"));
    }

    let micros = nanos / 1_000;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let micros = micros.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        );
        if micros % 1_000_000 != 0 {
            clock.push_str(&format!(".{:06}", micros % 1_000_000));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

#[async_trait(?Send)]
impl DataSink for DuckDBSink {
    async fn load(&self, artifact: &SpoolArtifact) -> SinkResult<()> {
        let sql = load_statement(&self.table, artifact.location(), self.delimiter);
        debug!(file = %artifact.source(), sql = %sql, "bulk load");

        let conn = self.lock()?;
        conn.execute_batch(&sql)
            .map_err(|e| SinkError::LoadFailed(format!("{}: {}", artifact.source(), e)))
    }

    async fn health_check(&self) -> SinkResult<bool> {
        let result = self.execute_query("SELECT 1 AS healthy").await?;
        Ok(!result.rows.is_empty())
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> SinkResult<()> {
        // The connection is closed when the sink is dropped
        Ok(())
    }
}
