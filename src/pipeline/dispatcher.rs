//! Load dispatcher
//!
//! Single consumer of the completion queue. Artifacts are loaded in the order they
//! arrive, which is the order their transformers finished.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::report::LoadedArtifact;
use super::spool::SpoolArtifact;
use super::telemetry::{PipelineEvent, Telemetry};
use super::{PipelineError, Stage};
use crate::database::DataSink;

/// What the dispatcher did
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Artifacts the sink accepted, in load order
    pub loaded: Vec<LoadedArtifact>,
    /// Load failures and artifacts discarded after cancellation
    pub errors: Vec<PipelineError>,
}

/// Load every artifact from `completed` into `sink` until the queue is closed.
///
/// A failed load is reported and the next artifact is processed. When `cancel`
/// fires, no further loads are started: the queue is closed and the remaining
/// artifacts are discarded.
pub async fn dispatch(
    mut completed: mpsc::Receiver<SpoolArtifact>,
    sink: &dyn DataSink,
    telemetry: &dyn Telemetry,
    cancel: &CancellationToken,
    keep_artifacts: bool,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    loop {
        let artifact = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = completed.recv() => match next {
                Some(artifact) => artifact,
                None => return report,
            },
        };

        let file = artifact.source().clone();
        telemetry.emit(PipelineEvent::Loading {
            file: file.clone(),
            location: artifact.location().to_path_buf(),
        });

        let result = sink.load(&artifact).await;
        let (rows, bytes) = (artifact.rows(), artifact.bytes());
        let kept_at = if keep_artifacts {
            match artifact.keep() {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(file = %file, error = %e, "failed to keep spool artifact");
                    None
                }
            }
        } else {
            drop(artifact);
            None
        };

        match result {
            Ok(()) => {
                telemetry.emit(PipelineEvent::Loaded {
                    file: file.clone(),
                    rows,
                });
                report.loaded.push(LoadedArtifact {
                    source: file,
                    rows,
                    bytes,
                    kept_at,
                });
            }
            Err(e) => {
                let cause = match &kept_at {
                    Some(path) => {
                        warn!(file = %file, kept = %path.display(), "load failed, artifact kept");
                        format!("{}; rows kept at {}", e, path.display())
                    }
                    None => e.to_string(),
                };
                let err = PipelineError::Load { file, cause };
                telemetry.emit(PipelineEvent::Failed(err.clone()));
                report.errors.push(err);
            }
        }
    }

    debug!("dispatch cancelled, discarding remaining artifacts");
    completed.close();
    while let Some(artifact) = completed.recv().await {
        let err = PipelineError::Cancelled {
            file: artifact.source().clone(),
            stage: Stage::LoadDispatcher,
        };
        telemetry.emit(PipelineEvent::Failed(err.clone()));
        report.errors.push(err);
    }

    report
}
