//! Concurrent extraction and spooling pipeline
//!
//! For every input file a reader and a transformer run as a pair, connected by a
//! bounded handoff queue. Each transformer spools its rows into a temporary artifact
//! and publishes it on a shared completion queue as soon as it is done. A single
//! dispatcher drains that queue in arrival order and hands every artifact to a
//! [`DataSink`](crate::database::DataSink).
//!
//! ```text
//! path -> reader -> lines -> transformer -> artifact ─┐
//! path -> reader -> lines -> transformer -> artifact ─┼-> completions -> dispatcher -> sink
//! path -> reader -> lines -> transformer -> artifact ─┘
//! ```
//!
//! ## Guarantees
//!
//! - Rows of one file keep the order of their source lines.
//! - No ordering across files: fast files load while slow ones are still running.
//! - A failure in one file is reported and never stops the other files.
//! - The completion queue closes exactly once, after the last pair has finished.
//!
//! ## Example
//!
//! ```rust,ignore
//! use textsql::pipeline::{InputSpec, Pipeline, PipelineOptions};
//! use textsql::extract::ExtractionRule;
//!
//! let rule = ExtractionRule::new(r"(\d{4}-\d{2}-\d{2}) (\w) (\d+)", "$1,$2,$3")?;
//! let pipeline = Pipeline::new(PipelineOptions::default()).with_rule(rule);
//!
//! let inputs = vec![InputSpec::new("a.log"), InputSpec::new("b.log")];
//! let report = pipeline.run(&inputs, &sink).await;
//! println!("Loaded {} rows from {} files", report.rows_loaded, report.loaded.len());
//! ```

pub mod dispatcher;
mod error;
pub mod reader;
mod report;
pub mod spool;
pub mod supervisor;
pub mod telemetry;
pub mod transformer;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::database::DataSink;
use crate::extract::ExtractionRule;

pub use error::{PipelineError, Stage};
pub use report::{LoadedArtifact, PipelineReport};
pub use spool::SpoolArtifact;
pub use supervisor::Supervisor;
pub use telemetry::{PipelineEvent, RecordingTelemetry, Telemetry, TracingTelemetry};

/// Default number of lines buffered between a reader and its transformer
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// One input file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputSpec {
    path: PathBuf,
}

impl InputSpec {
    /// Create an input from a path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the input file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// A line read from an input, without its line terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Line content
    pub text: Vec<u8>,
    /// Input the line was read from
    pub source: InputSpec,
    /// 1-based line number
    pub number: u64,
}

/// Item on a reader-to-transformer handoff queue
#[derive(Debug)]
pub enum Handoff {
    /// The next line of the input
    Line(RawLine),
    /// The whole input was read successfully
    End,
}

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Lines buffered per handoff queue
    pub queue_capacity: usize,
    /// Directory for spool artifacts (platform temp directory if `None`)
    pub spool_dir: Option<PathBuf>,
    /// Do not publish artifacts that contain no rows
    pub skip_empty: bool,
    /// Keep spool artifacts on disk after they were handed to the sink
    pub keep_artifacts: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            spool_dir: None,
            skip_empty: false,
            keep_artifacts: false,
        }
    }
}

/// Entry point: runs the supervisor and the dispatcher for a set of inputs
pub struct Pipeline {
    options: PipelineOptions,
    rule: Option<Arc<ExtractionRule>>,
    telemetry: Arc<dyn Telemetry>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a pass-through pipeline that logs through `tracing`
    pub fn new(mut options: PipelineOptions) -> Self {
        options.queue_capacity = options.queue_capacity.max(1);
        Self {
            options,
            rule: None,
            telemetry: Arc::new(TracingTelemetry),
            cancel: CancellationToken::new(),
        }
    }

    /// Extract rows with `rule` instead of passing lines through
    pub fn with_rule(mut self, rule: ExtractionRule) -> Self {
        self.rule = Some(Arc::new(rule));
        self
    }

    /// Send events to `telemetry`
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Options the pipeline runs with
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Check if lines are passed through unchanged
    pub fn is_pass_through(&self) -> bool {
        self.rule.is_none()
    }

    /// Process every input and load the resulting artifacts into `sink`.
    ///
    /// Per-file failures do not end the run; they are reported to the telemetry
    /// and collected in the returned report. The caller decides what they mean for
    /// the exit status.
    pub async fn run(&self, inputs: &[InputSpec], sink: &dyn DataSink) -> PipelineReport {
        let start = Instant::now();
        info!(
            files = inputs.len(),
            mode = if self.is_pass_through() { "pass-through" } else { "extract" },
            sink = sink.backend_type(),
            "Starting pipeline"
        );

        let (supervisor, completed) = Supervisor::start(
            inputs,
            &self.options,
            self.rule.clone(),
            self.telemetry.clone(),
            self.cancel.clone(),
        );

        let (supervised, dispatched) = tokio::join!(
            supervisor.wait(),
            dispatcher::dispatch(
                completed,
                sink,
                self.telemetry.as_ref(),
                &self.cancel,
                self.options.keep_artifacts,
            )
        );

        let mut report = PipelineReport::new(inputs.len());
        report.files_published = supervised.published;
        report.lines_read = supervised.lines_read;
        report.errors.extend(supervised.errors);
        report.errors.extend(dispatched.errors);
        report.rows_loaded = dispatched.loaded.iter().map(|a| a.rows).sum();
        report.loaded = dispatched.loaded;
        report.duration = start.elapsed();

        info!(
            files = report.files_total,
            loaded = report.loaded.len(),
            rows = report.rows_loaded,
            errors = report.errors.len(),
            duration = %report.duration_string(),
            "Pipeline completed"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_spec_display() {
        let spec = InputSpec::new("/var/log/app.log");
        assert_eq!(spec.to_string(), "/var/log/app.log");
        assert_eq!(spec.path(), Path::new("/var/log/app.log"));
    }

    #[test]
    fn test_default_options() {
        let options = PipelineOptions::default();
        assert_eq!(options.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(options.spool_dir.is_none());
        assert!(!options.skip_empty);
        assert!(!options.keep_artifacts);
    }

    #[test]
    fn test_zero_queue_capacity_is_clamped() {
        let pipeline = Pipeline::new(PipelineOptions {
            queue_capacity: 0,
            ..Default::default()
        });
        assert_eq!(pipeline.options().queue_capacity, 1);
        assert!(pipeline.is_pass_through());
    }
}
