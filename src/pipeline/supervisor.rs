//! Pipeline supervisor
//!
//! Starts one reader/transformer pair per input and owns the completion queue.
//! The queue is closed by dropping the supervisor's sender, which only happens in
//! [`Supervisor::wait`] after every pair has been joined, so it closes exactly once
//! and never before the last artifact is published.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::reader;
use super::spool::SpoolArtifact;
use super::telemetry::{PipelineEvent, Telemetry};
use super::transformer::{self, TransformOutcome, TransformSettings};
use super::{InputSpec, PipelineError, PipelineOptions};
use crate::extract::ExtractionRule;

/// Everything a pair needs, captured when the pair is spawned
#[derive(Clone)]
struct PairContext {
    rule: Option<Arc<ExtractionRule>>,
    spool_dir: Option<PathBuf>,
    queue_capacity: usize,
    skip_empty: bool,
    telemetry: Arc<dyn Telemetry>,
    cancel: CancellationToken,
    completion: mpsc::Sender<SpoolArtifact>,
}

/// Result of one reader/transformer pair
#[derive(Debug)]
struct PairReport {
    lines_read: u64,
    published: bool,
    errors: Vec<PipelineError>,
}

/// Totals over all pairs
#[derive(Debug, Default)]
pub struct SupervisorSummary {
    /// Artifacts published on the completion queue
    pub published: usize,
    /// Lines read across all inputs
    pub lines_read: u64,
    /// Reader and transformer failures
    pub errors: Vec<PipelineError>,
}

/// Owns the fan-out of pairs and the fan-in completion queue
pub struct Supervisor {
    pairs: JoinSet<PairReport>,
    files: HashMap<task::Id, InputSpec>,
    telemetry: Arc<dyn Telemetry>,
    completion: Option<mpsc::Sender<SpoolArtifact>>,
}

impl Supervisor {
    /// Spawn a pair per input and return the receiving end of the completion queue.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(
        inputs: &[InputSpec],
        options: &PipelineOptions,
        rule: Option<Arc<ExtractionRule>>,
        telemetry: Arc<dyn Telemetry>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<SpoolArtifact>) {
        // Each input publishes at most once, so sends never wait on the dispatcher
        let (completion, completed) = mpsc::channel(inputs.len().max(1));

        let context = PairContext {
            rule,
            spool_dir: options.spool_dir.clone(),
            queue_capacity: options.queue_capacity.max(1),
            skip_empty: options.skip_empty,
            telemetry: telemetry.clone(),
            cancel,
            completion: completion.clone(),
        };

        let mut pairs = JoinSet::new();
        let mut files = HashMap::with_capacity(inputs.len());
        for file in inputs {
            // Owned copies per pair; nothing is shared with the loop
            let handle = pairs.spawn(run_pair(file.clone(), context.clone()));
            files.insert(handle.id(), file.clone());
        }
        debug!(pairs = inputs.len(), "pairs started");

        (
            Self {
                pairs,
                files,
                telemetry,
                completion: Some(completion),
            },
            completed,
        )
    }

    /// Number of pairs that have not been joined yet
    pub fn pending(&self) -> usize {
        self.pairs.len()
    }

    /// Join every pair, then close the completion queue.
    pub async fn wait(mut self) -> SupervisorSummary {
        let mut summary = SupervisorSummary::default();

        while let Some(joined) = self.pairs.join_next_with_id().await {
            match joined {
                Ok((id, pair)) => {
                    self.files.remove(&id);
                    summary.lines_read += pair.lines_read;
                    if pair.published {
                        summary.published += 1;
                    }
                    summary.errors.extend(pair.errors);
                }
                Err(e) => {
                    let Some(file) = self.files.remove(&e.id()) else {
                        error!(error = %e, "pair task failed");
                        continue;
                    };
                    let err = PipelineError::Transform {
                        file,
                        cause: task_failure("pair", e),
                    };
                    self.telemetry.emit(PipelineEvent::Failed(err.clone()));
                    summary.errors.push(err);
                }
            }
        }

        drop(self.completion.take());
        debug!(published = summary.published, "completion queue closed");

        summary
    }
}

async fn run_pair(file: InputSpec, context: PairContext) -> PairReport {
    context
        .telemetry
        .emit(PipelineEvent::Processing { file: file.clone() });

    let (lines, queue) = mpsc::channel(context.queue_capacity);

    let reading = {
        let file = file.clone();
        let cancel = context.cancel.clone();
        tokio::task::spawn_blocking(move || reader::read_lines(&file, lines, &cancel))
    };

    let transforming = {
        let file = file.clone();
        let context = context.clone();
        tokio::task::spawn_blocking(move || {
            let settings = TransformSettings {
                rule: context.rule.as_deref(),
                spool_dir: context.spool_dir.as_deref(),
                skip_empty: context.skip_empty,
            };
            transformer::transform(
                &file,
                queue,
                settings,
                &context.completion,
                context.telemetry.as_ref(),
            )
        })
    };

    let (read, transformed) = tokio::join!(reading, transforming);

    let mut report = PairReport {
        lines_read: 0,
        published: false,
        errors: Vec::new(),
    };

    match read {
        Ok(Ok(lines)) => report.lines_read = lines,
        Ok(Err(e)) => report.errors.push(e),
        Err(e) => report.errors.push(PipelineError::Read {
            file: file.clone(),
            cause: task_failure("reader", e),
        }),
    }

    match transformed {
        Ok(Ok(TransformOutcome::Published { .. })) => report.published = true,
        Ok(Ok(TransformOutcome::SkippedEmpty | TransformOutcome::Abandoned)) => {}
        Ok(Err(e)) => report.errors.push(e),
        Err(e) => report.errors.push(PipelineError::Transform {
            file: file.clone(),
            cause: task_failure("transformer", e),
        }),
    }

    for err in &report.errors {
        context.telemetry.emit(PipelineEvent::Failed(err.clone()));
    }

    report
}

fn task_failure(task: &str, e: JoinError) -> String {
    if e.is_panic() {
        format!("{} panicked", task)
    } else {
        format!("{} task was cancelled", task)
    }
}
