//! Run summary

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use super::{InputSpec, PipelineError};

/// An artifact the sink accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedArtifact {
    /// Input file the rows came from
    pub source: InputSpec,
    /// Number of rows loaded
    pub rows: u64,
    /// Size of the artifact in bytes
    pub bytes: u64,
    /// Where the artifact was kept, if it was not deleted after loading
    pub kept_at: Option<PathBuf>,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Number of inputs given to the run
    pub files_total: usize,
    /// Number of artifacts published on the completion queue
    pub files_published: usize,
    /// Lines read across all inputs
    pub lines_read: u64,
    /// Artifacts loaded, in the order they were loaded
    pub loaded: Vec<LoadedArtifact>,
    /// Rows loaded across all artifacts
    pub rows_loaded: u64,
    /// Every per-file failure of the run
    pub errors: Vec<PipelineError>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl PipelineReport {
    /// Create an empty report for `files_total` inputs
    pub fn new(files_total: usize) -> Self {
        Self {
            files_total,
            ..Default::default()
        }
    }

    /// Check if the run finished without any failure
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Inputs with at least one failure, in path order
    pub fn failed_files(&self) -> Vec<InputSpec> {
        self.errors
            .iter()
            .map(|e| e.file().path().to_path_buf())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(InputSpec::new)
            .collect()
    }

    /// Get rows per second throughput
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.rows_loaded as f64 / secs
        }
    }

    /// One-line summary for the end of a run
    pub fn summary(&self) -> String {
        format!(
            "Loaded {} rows from {}/{} files in {} ({:.0} rows/s)",
            self.rows_loaded,
            self.loaded.len(),
            self.files_total,
            self.duration_string(),
            self.throughput()
        )
    }

    /// Format duration as human-readable string
    pub fn duration_string(&self) -> String {
        let millis = self.duration.as_millis();
        let secs = self.duration.as_secs();
        if secs == 0 {
            format!("{}ms", millis)
        } else if secs < 60 {
            format!("{}.{:03}s", secs, millis % 1000)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success() {
        let report = PipelineReport::new(3);
        assert!(report.is_success());
        assert_eq!(report.files_total, 3);
        assert!(report.failed_files().is_empty());
    }

    #[test]
    fn test_failed_files_deduplicated() {
        let mut report = PipelineReport::new(2);
        let file = InputSpec::new("b.log");
        report.errors.push(PipelineError::Read {
            file: file.clone(),
            cause: "io".to_string(),
        });
        report.errors.push(PipelineError::Load {
            file: file.clone(),
            cause: "sink".to_string(),
        });
        report.errors.push(PipelineError::Open {
            file: InputSpec::new("a.log"),
            cause: "missing".to_string(),
        });

        assert!(!report.is_success());
        assert_eq!(
            report.failed_files(),
            vec![InputSpec::new("a.log"), InputSpec::new("b.log")]
        );
    }

    #[test]
    fn test_throughput() {
        let mut report = PipelineReport::new(1);
        report.rows_loaded = 1000;
        report.duration = Duration::from_secs(10);
        assert_eq!(report.throughput(), 100.0);

        report.duration = Duration::ZERO;
        assert_eq!(report.throughput(), 0.0);
    }

    #[test]
    fn test_summary_includes_throughput() {
        let mut report = PipelineReport::new(2);
        report.rows_loaded = 500;
        report.loaded.push(LoadedArtifact {
            source: InputSpec::new("a.log"),
            rows: 500,
            bytes: 4000,
            kept_at: None,
        });
        report.duration = Duration::from_millis(2500);
        assert_eq!(
            report.summary(),
            "Loaded 500 rows from 1/2 files in 2.500s (200 rows/s)"
        );
    }

    #[test]
    fn test_duration_formatting() {
        let mut report = PipelineReport::new(0);

        report.duration = Duration::from_millis(250);
        assert_eq!(report.duration_string(), "250ms");

        report.duration = Duration::from_millis(1500);
        assert_eq!(report.duration_string(), "1.500s");

        report.duration = Duration::from_secs(90);
        assert_eq!(report.duration_string(), "1m 30s");

        report.duration = Duration::from_secs(3661);
        assert_eq!(report.duration_string(), "1h 1m 1s");
    }
}
