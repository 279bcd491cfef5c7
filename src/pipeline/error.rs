//! Per-file pipeline errors

use std::fmt;

use super::InputSpec;

/// Pipeline stage a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Opening or reading the input file
    Reader,
    /// Building or finalizing the spool artifact
    Transformer,
    /// Handing the artifact to the data sink
    LoadDispatcher,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Reader => write!(f, "reader"),
            Stage::Transformer => write!(f, "transformer"),
            Stage::LoadDispatcher => write!(f, "load dispatcher"),
        }
    }
}

/// A failure isolated to one input file.
///
/// Never aborts sibling files; collected into the run report instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// The input file could not be opened
    #[error("Failed to open {file}: {cause}")]
    Open { file: InputSpec, cause: String },

    /// Reading the input failed after it was opened
    #[error("Failed to read {file}: {cause}")]
    Read { file: InputSpec, cause: String },

    /// The spool artifact could not be allocated, written or finalized
    #[error("Failed to spool rows for {file}: {cause}")]
    Transform { file: InputSpec, cause: String },

    /// The data sink rejected the artifact
    #[error("Failed to load {file}: {cause}")]
    Load { file: InputSpec, cause: String },

    /// Work was abandoned because the run was cancelled
    #[error("Processing of {file} was cancelled in the {stage}")]
    Cancelled { file: InputSpec, stage: Stage },
}

impl PipelineError {
    /// Input file the failure belongs to
    pub fn file(&self) -> &InputSpec {
        match self {
            PipelineError::Open { file, .. }
            | PipelineError::Read { file, .. }
            | PipelineError::Transform { file, .. }
            | PipelineError::Load { file, .. }
            | PipelineError::Cancelled { file, .. } => file,
        }
    }

    /// Stage the failure originated from
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Open { .. } | PipelineError::Read { .. } => Stage::Reader,
            PipelineError::Transform { .. } => Stage::Transformer,
            PipelineError::Load { .. } => Stage::LoadDispatcher,
            PipelineError::Cancelled { stage, .. } => *stage,
        }
    }

    /// Human-readable cause without the file prefix
    pub fn cause(&self) -> String {
        match self {
            PipelineError::Open { cause, .. }
            | PipelineError::Read { cause, .. }
            | PipelineError::Transform { cause, .. }
            | PipelineError::Load { cause, .. } => cause.clone(),
            PipelineError::Cancelled { .. } => "cancelled".to_string(),
        }
    }

    /// Check if the failure was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        let file = InputSpec::new("a.log");
        let open = PipelineError::Open {
            file: file.clone(),
            cause: "No such file".to_string(),
        };
        assert_eq!(open.stage(), Stage::Reader);
        assert_eq!(open.file(), &file);
        assert_eq!(open.cause(), "No such file");

        let cancelled = PipelineError::Cancelled {
            file: file.clone(),
            stage: Stage::LoadDispatcher,
        };
        assert_eq!(cancelled.stage(), Stage::LoadDispatcher);
        assert!(cancelled.is_cancelled());
        assert!(!open.is_cancelled());
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::Load {
            file: InputSpec::new("b.log"),
            cause: "table missing".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to load b.log: table missing");
    }
}
