//! File transformer
//!
//! Drains the handoff queue of one input, turns each line into rows and appends
//! them to a freshly allocated spool artifact. The artifact is published on the
//! completion queue only when the reader signalled a complete input and the file
//! was finalized without error.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::debug;

use super::spool::{SpoolArtifact, SpoolWriter};
use super::telemetry::{PipelineEvent, Telemetry};
use super::{Handoff, InputSpec, PipelineError, Stage};
use crate::extract::{ExtractionRule, TabularRow};

/// Settings shared by every transformer of a run
#[derive(Debug, Clone, Copy)]
pub struct TransformSettings<'a> {
    /// Rule applied to each line; `None` passes lines through unchanged
    pub rule: Option<&'a ExtractionRule>,
    /// Directory for spool files; `None` uses the platform temp directory
    pub spool_dir: Option<&'a Path>,
    /// Discard artifacts that ended up with no rows
    pub skip_empty: bool,
}

/// What happened to the artifact of one input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    /// Published on the completion queue
    Published { rows: u64 },
    /// Not published because it had no rows and empty artifacts are skipped
    SkippedEmpty,
    /// Not published because the input ended without the end marker
    Abandoned,
}

/// Transform one input.
///
/// Runs on a blocking thread.
pub fn transform(
    file: &InputSpec,
    mut queue: mpsc::Receiver<Handoff>,
    settings: TransformSettings<'_>,
    completion: &mpsc::Sender<SpoolArtifact>,
    telemetry: &dyn Telemetry,
) -> Result<TransformOutcome, PipelineError> {
    let transform_error = |e: std::io::Error| PipelineError::Transform {
        file: file.clone(),
        cause: e.to_string(),
    };

    let mut writer =
        SpoolWriter::create(file.clone(), settings.spool_dir).map_err(transform_error)?;
    debug!(file = %file, location = %writer.location().display(), "spool allocated");

    let mut complete = false;
    while let Some(item) = queue.blocking_recv() {
        match item {
            Handoff::Line(line) => match settings.rule {
                Some(rule) => {
                    for row in rule.extract(&line.text) {
                        writer.write_row(&row).map_err(transform_error)?;
                    }
                }
                None => {
                    writer
                        .write_row(&TabularRow::from(line.text))
                        .map_err(transform_error)?;
                }
            },
            Handoff::End => {
                complete = true;
                break;
            }
        }
    }

    if !complete {
        // The reader failed or was cancelled and has reported it; the writer is
        // dropped here, which deletes the partial file.
        debug!(file = %file, rows = writer.rows(), "input incomplete, spool discarded");
        return Ok(TransformOutcome::Abandoned);
    }

    if settings.skip_empty && writer.rows() == 0 {
        debug!(file = %file, "no rows, spool discarded");
        return Ok(TransformOutcome::SkippedEmpty);
    }

    let artifact = writer.finish().map_err(transform_error)?;
    let rows = artifact.rows();
    telemetry.emit(PipelineEvent::Finished {
        file: file.clone(),
        rows,
    });

    if completion.blocking_send(artifact).is_err() {
        return Err(PipelineError::Cancelled {
            file: file.clone(),
            stage: Stage::Transformer,
        });
    }

    Ok(TransformOutcome::Published { rows })
}
