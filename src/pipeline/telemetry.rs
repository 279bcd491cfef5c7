//! Progress and failure notifications
//!
//! The pipeline never writes to a console directly. It emits [`PipelineEvent`]s to a
//! [`Telemetry`] implementation; [`TracingTelemetry`] turns them into `tracing`
//! records, which is what the CLI uses.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{error, info, warn};

use super::{InputSpec, PipelineError};

/// Something worth telling the user about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A reader/transformer pair started on a file
    Processing { file: InputSpec },
    /// A transformer finalized the spool artifact for a file
    Finished { file: InputSpec, rows: u64 },
    /// The dispatcher is handing an artifact to the sink
    Loading { file: InputSpec, location: PathBuf },
    /// The sink accepted an artifact
    Loaded { file: InputSpec, rows: u64 },
    /// A per-file failure
    Failed(PipelineError),
}

/// Receiver for pipeline events.
///
/// Called concurrently from reader, transformer and dispatcher tasks.
pub trait Telemetry: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Logs events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Processing { file } => info!(file = %file, "processing"),
            PipelineEvent::Finished { file, rows } => info!(file = %file, rows, "finished"),
            PipelineEvent::Loading { file, location } => {
                info!(file = %file, location = %location.display(), "loading")
            }
            PipelineEvent::Loaded { file, rows } => info!(file = %file, rows, "loaded"),
            PipelineEvent::Failed(err) if err.is_cancelled() => {
                warn!(file = %err.file(), stage = %err.stage(), "cancelled")
            }
            PipelineEvent::Failed(err) => {
                error!(file = %err.file(), stage = %err.stage(), cause = %err.cause(), "failed")
            }
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingTelemetry {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<PipelineEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Failures recorded so far
    pub fn failures(&self) -> Vec<PipelineError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Failed(err) => Some(err),
                _ => None,
            })
            .collect()
    }
}

impl Telemetry for RecordingTelemetry {
    fn emit(&self, event: PipelineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
