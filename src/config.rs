//! Configuration file support
//!
//! Handles parsing of `.textsql.toml` configuration files and environment
//! variable overrides. Command line flags are applied on top by the CLI.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::database::{DEFAULT_DELIMITER, DEFAULT_TABLE};
use crate::extract::{ExtractError, ExtractionRule};
use crate::pipeline::{DEFAULT_QUEUE_CAPACITY, PipelineOptions};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = ".textsql.toml";

/// Environment variable for the DuckDB path
pub const ENV_DUCKDB_PATH: &str = "TEXTSQL_DUCKDB_PATH";

/// Environment variable for the spool directory
pub const ENV_SPOOL_DIR: &str = "TEXTSQL_SPOOL_DIR";

/// Environment variable for the handoff queue capacity
pub const ENV_QUEUE_CAPACITY: &str = "TEXTSQL_QUEUE_CAPACITY";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializationError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid extraction rule: {0}")]
    Extract(#[from] ExtractError),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Database configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Persist the database to this file; in-memory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Table rows are loaded into
    #[serde(default = "default_table")]
    pub table: String,

    /// Column delimiter of produced rows
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_delimiter() -> char {
    DEFAULT_DELIMITER
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: None,
            table: default_table(),
            delimiter: default_delimiter(),
        }
    }
}

/// Pipeline configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Lines buffered between each reader and its transformer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Directory for spool files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,

    /// Do not load files that produced no rows
    #[serde(default)]
    pub skip_empty: bool,

    /// Keep spool files after loading
    #[serde(default)]
    pub keep_artifacts: bool,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            spool_dir: None,
            skip_empty: false,
            keep_artifacts: false,
        }
    }
}

/// Extraction rule section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractSection {
    /// Regular expression matched against every line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Row template with `$1` / `${name}` references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Main configuration structure
///
/// Represents the `.textsql.toml` configuration file format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextSqlConfig {
    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub extract: ExtractSection,
}

impl TextSqlConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `.textsql.toml` from a directory, falling back to defaults if it is
    /// missing. Environment overrides are applied.
    pub fn load(dir: &Path) -> ConfigResult<Self> {
        let config_path = dir.join(CONFIG_FILENAME);
        let mut config = if config_path.exists() {
            Self::read(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load an explicitly named configuration file, which must exist.
    /// Environment overrides are applied.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a directory
    pub fn save(&self, dir: &Path) -> ConfigResult<()> {
        let config_path = dir.join(CONFIG_FILENAME);
        let content = self.to_toml()?;

        std::fs::write(&config_path, content)
            .map_err(|e| ConfigError::IoError(format!("Failed to write config: {}", e)))
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializationError(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparseable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DUCKDB_PATH)
            && !path.is_empty()
        {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(dir) = lookup(ENV_SPOOL_DIR)
            && !dir.is_empty()
        {
            self.pipeline.spool_dir = Some(PathBuf::from(dir));
        }

        if let Some(capacity) = lookup(ENV_QUEUE_CAPACITY)
            && let Ok(capacity) = capacity.trim().parse()
        {
            self.pipeline.queue_capacity = capacity;
        }
    }

    /// Check values that cannot be expressed by the types alone
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }

        if self.database.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table name is empty".to_string()));
        }

        if matches!(self.database.delimiter, '\n' | '\r' | '"') {
            return Err(ConfigError::Invalid(format!(
                "{:?} cannot be used as delimiter",
                self.database.delimiter
            )));
        }

        match (&self.extract.pattern, &self.extract.template) {
            (Some(_), None) => Err(ConfigError::Invalid(
                "pattern is set but template is missing".to_string(),
            )),
            (None, Some(_)) => Err(ConfigError::Invalid(
                "template is set but pattern is missing".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Compile the configured extraction rule; `None` means pass-through
    pub fn extraction_rule(&self) -> ConfigResult<Option<ExtractionRule>> {
        match (&self.extract.pattern, &self.extract.template) {
            (Some(pattern), Some(template)) => Ok(Some(ExtractionRule::new(pattern, template)?)),
            _ => Ok(None),
        }
    }

    /// Pipeline tuning derived from the configuration
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            queue_capacity: self.pipeline.queue_capacity,
            spool_dir: self.pipeline.spool_dir.clone(),
            skip_empty: self.pipeline.skip_empty,
            keep_artifacts: self.pipeline.keep_artifacts,
        }
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# textsql configuration

[database]
# Persist the database to a file; in-memory when omitted
# path = "rows.duckdb"

# Table the rows are loaded into
table = "data"

# Column delimiter of the rows produced by the template
delimiter = ","

[pipeline]
# Lines buffered between each reader and its transformer
queue_capacity = 1024

# Directory for spool files (platform temp directory when omitted)
# spool_dir = "/var/tmp"

# Do not load files that produced no rows
skip_empty = false

# Keep spool files on disk after they were loaded
keep_artifacts = false

[extract]
# Lines are loaded unchanged unless both are set
# pattern = '(\d{4}-\d{2}-\d{2}) (\w+) (\d+)'
# template = '$1,$2,$3'
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = TextSqlConfig::new();
        assert!(config.database.path.is_none());
        assert_eq!(config.database.table, "data");
        assert_eq!(config.database.delimiter, ',');
        assert_eq!(config.pipeline.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.validate().is_ok());
        assert!(config.extraction_rule().unwrap().is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
path = "rows.duckdb"
table = "events"
delimiter = "|"

[pipeline]
queue_capacity = 16
skip_empty = true

[extract]
pattern = '(\w+)=(\d+)'
template = '$1|$2'
"#;
        let config = TextSqlConfig::parse(toml).unwrap();
        assert_eq!(config.database.path, Some(PathBuf::from("rows.duckdb")));
        assert_eq!(config.database.table, "events");
        assert_eq!(config.database.delimiter, '|');
        assert_eq!(config.pipeline.queue_capacity, 16);
        assert!(config.pipeline.skip_empty);
        assert!(!config.pipeline.keep_artifacts);

        let rule = config.extraction_rule().unwrap().unwrap();
        assert_eq!(rule.template(), "$1|$2");
    }

    #[test]
    fn test_parse_error() {
        let err = TextSqlConfig::parse("[pipeline]\nqueue_capacity = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = TextSqlConfig::new();
        config.pipeline.queue_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = TextSqlConfig::new();
        config.database.table = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = TextSqlConfig::new();
        config.database.delimiter = '\n';
        assert!(config.validate().is_err());

        let mut config = TextSqlConfig::new();
        config.extract.pattern = Some("(x)".to_string());
        assert!(config.validate().is_err());

        config.extract.pattern = None;
        config.extract.template = Some("$1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_rule() {
        let mut config = TextSqlConfig::new();
        config.extract.pattern = Some("(x)".to_string());
        config.extract.template = Some("$2".to_string());
        assert!(matches!(
            config.extraction_rule(),
            Err(ConfigError::Extract(ExtractError::UnknownGroup(_)))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DUCKDB_PATH, "/data/rows.duckdb"),
            (ENV_SPOOL_DIR, "/scratch"),
            (ENV_QUEUE_CAPACITY, "64"),
        ]);

        let mut config = TextSqlConfig::new();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, Some(PathBuf::from("/data/rows.duckdb")));
        assert_eq!(config.pipeline.spool_dir, Some(PathBuf::from("/scratch")));
        assert_eq!(config.pipeline.queue_capacity, 64);
    }

    #[test]
    fn test_unparseable_override_ignored() {
        let mut config = TextSqlConfig::new();
        config.apply_overrides(|key| (key == ENV_QUEUE_CAPACITY).then(|| "lots".to_string()));
        assert_eq!(config.pipeline.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_pipeline_options() {
        let mut config = TextSqlConfig::new();
        config.pipeline.queue_capacity = 8;
        config.pipeline.keep_artifacts = true;

        let options = config.pipeline_options();
        assert_eq!(options.queue_capacity, 8);
        assert!(options.keep_artifacts);
        assert!(!options.skip_empty);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let mut config = TextSqlConfig::new();
        config.database.table = "saved".to_string();
        config.extract.pattern = Some(r"(\d+)".to_string());
        config.extract.template = Some("$1".to_string());

        config.save(dir.path()).unwrap();
        assert!(dir.path().join(CONFIG_FILENAME).exists());

        let loaded = TextSqlConfig::read(&dir.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let err = TextSqlConfig::load_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = TextSqlConfig::parse(sample_config()).unwrap();
        assert_eq!(config, TextSqlConfig::new());
    }
}
