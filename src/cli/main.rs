//! CLI binary entry point for textsql

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use textsql::cli::commands::{LoadArgs, LoadSummary, handle_load};
use textsql::cli::{LogLevel, init_logging};
use textsql::config::{CONFIG_FILENAME, TextSqlConfig, sample_config};
use textsql::database::OutputFormat;

#[derive(Parser)]
#[command(name = "textsql")]
#[command(about = "Extract rows from text files, load them into DuckDB and query them with SQL")]
#[command(version)]
struct Cli {
    /// Column definitions of the target table, e.g. "day DATE, category VARCHAR, n INTEGER"
    #[arg(short, long, required_unless_present = "sample_config")]
    format: Option<String>,

    /// Regular expression applied to every line
    #[arg(long, requires = "template")]
    pattern: Option<String>,

    /// Row template for each match, e.g. "$1,$2,$3"
    #[arg(short, long, requires = "pattern")]
    template: Option<String>,

    /// Persist the database to this file instead of keeping it in memory
    #[arg(short, long)]
    persist: Option<PathBuf>,

    /// SQL to run after loading: statements separated by ';', or a script file
    #[arg(short, long)]
    command: Option<String>,

    /// Output format of command results (table, json, csv)
    #[arg(short, long, default_value = "table")]
    output: OutputFormat,

    /// Configuration file (default: ./.textsql.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target table name
    #[arg(long)]
    table: Option<String>,

    /// Column delimiter of the produced rows
    #[arg(long)]
    delimiter: Option<char>,

    /// Lines buffered between each reader and its transformer
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    queue_capacity: Option<u64>,

    /// Directory for spool files
    #[arg(long)]
    spool_dir: Option<PathBuf>,

    /// Do not load files that produced no rows
    #[arg(long)]
    skip_empty: bool,

    /// Keep spool files after loading
    #[arg(long)]
    keep_artifacts: bool,

    /// Write the effective settings to ./.textsql.toml before loading
    #[arg(long)]
    save_config: bool,

    /// Print a commented sample configuration file and exit
    #[arg(long)]
    sample_config: bool,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Input files
    #[arg(required_unless_present = "sample_config")]
    inputs: Vec<PathBuf>,
}

impl Cli {
    /// Flags win over the configuration file and the environment
    fn apply_to(&self, config: &mut TextSqlConfig) {
        if let Some(path) = &self.persist {
            config.database.path = Some(path.clone());
        }
        if let Some(table) = &self.table {
            config.database.table = table.clone();
        }
        if let Some(delimiter) = self.delimiter {
            config.database.delimiter = delimiter;
        }
        if let Some(capacity) = self.queue_capacity {
            config.pipeline.queue_capacity = capacity as usize;
        }
        if let Some(dir) = &self.spool_dir {
            config.pipeline.spool_dir = Some(dir.clone());
        }
        config.pipeline.skip_empty |= self.skip_empty;
        config.pipeline.keep_artifacts |= self.keep_artifacts;

        if self.pattern.is_some() {
            config.extract.pattern = self.pattern.clone();
            config.extract.template = self.template.clone();
        }
    }
}

fn run(cli: Cli) -> Result<LoadSummary> {
    let mut config = match &cli.config {
        Some(path) => TextSqlConfig::load_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TextSqlConfig::load(Path::new("."))?,
    };
    cli.apply_to(&mut config);
    config.validate()?;

    if cli.save_config {
        config.save(Path::new("."))?;
        info!(file = CONFIG_FILENAME, "saved configuration");
    }

    let args = LoadArgs {
        format: cli.format.context("--format is required")?,
        inputs: cli.inputs,
        command: cli.command,
        output: cli.output,
    };

    Ok(handle_load(&args, &config)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.sample_config {
        print!("{}", sample_config());
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(cli.log_level) {
        eprintln!("{:#}", e);
        return ExitCode::from(2);
    }

    match run(cli) {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
