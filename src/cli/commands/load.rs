//! Load command
//!
//! Creates the target table, runs the pipeline over the inputs and then executes
//! the requested SQL commands against the same database.

use std::path::PathBuf;

use tracing::{info, warn};

use super::query::{resolve_commands, run_commands};
use crate::cli::error::CliError;
use crate::config::TextSqlConfig;
use crate::database::{DataSink, DuckDBSink, OutputFormat};
use crate::pipeline::{InputSpec, Pipeline, PipelineReport};

/// Load command arguments
#[derive(Debug, Clone)]
pub struct LoadArgs {
    /// Column definitions of the target table
    pub format: String,
    /// Files to load
    pub inputs: Vec<PathBuf>,
    /// SQL to run after loading, inline or as a script path
    pub command: Option<String>,
    /// Output format of command results
    pub output: OutputFormat,
}

/// Outcome of a load command
#[derive(Debug)]
pub struct LoadSummary {
    /// Report of the pipeline run
    pub report: PipelineReport,
    /// Number of SQL commands that failed
    pub failed_commands: usize,
}

impl LoadSummary {
    /// Check if every file loaded and every command succeeded
    pub fn is_success(&self) -> bool {
        self.report.is_success() && self.failed_commands == 0
    }
}

/// Run the load command on a fresh runtime
pub fn handle_load(args: &LoadArgs, config: &TextSqlConfig) -> Result<LoadSummary, CliError> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))?;

    rt.block_on(load(args, config))
}

/// Open the configured sink
pub fn open_sink(config: &TextSqlConfig) -> Result<DuckDBSink, CliError> {
    let sink = match &config.database.path {
        Some(path) => DuckDBSink::open(path)?,
        None => DuckDBSink::in_memory()?,
    };
    Ok(sink
        .with_table(config.database.table.clone())
        .with_delimiter(config.database.delimiter))
}

/// Load the inputs and run the commands
pub async fn load(args: &LoadArgs, config: &TextSqlConfig) -> Result<LoadSummary, CliError> {
    if args.inputs.is_empty() {
        return Err(CliError::InvalidArgument("no input files given".to_string()));
    }

    // Read the script up front so a bad path fails before any work is done
    let statements = match &args.command {
        Some(command) => resolve_commands(command)?,
        None => Vec::new(),
    };

    let rule = config.extraction_rule()?;
    let sink = open_sink(config)?;
    sink.create_table(&args.format)?;

    let mut pipeline = Pipeline::new(config.pipeline_options());
    if let Some(rule) = rule {
        pipeline = pipeline.with_rule(rule);
    }

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling pipeline");
            cancel.cancel();
        }
    });

    let inputs: Vec<InputSpec> = args.inputs.iter().map(InputSpec::new).collect();
    let report = pipeline.run(&inputs, &sink).await;

    eprintln!("{}", report.summary());
    for file in report.failed_files() {
        eprintln!("  failed: {}", file);
    }

    let failed_commands = if pipeline.cancellation_token().is_cancelled() {
        info!("skipping commands after cancellation");
        0
    } else {
        let mut stdout = std::io::stdout().lock();
        run_commands(&sink, &statements, args.output, &mut stdout).await?
    };

    sink.close().await?;

    Ok(LoadSummary {
        report,
        failed_commands,
    })
}
