//! In-memory sink
//!
//! Keeps the content of every loaded artifact. Useful in tests and for checking
//! what a run would load without touching a database.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{DataSink, SinkError, SinkResult};
use crate::pipeline::{InputSpec, SpoolArtifact};

/// An artifact captured by [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLoad {
    /// Input the artifact was produced from
    pub source: InputSpec,
    /// Rows of the artifact as recorded by the transformer
    pub rows: u64,
    /// File content at load time
    pub content: Vec<u8>,
}

/// Sink that records loads instead of executing them
#[derive(Debug, Default)]
pub struct MemorySink {
    loads: Mutex<Vec<CapturedLoad>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads in the order they happened
    pub fn loads(&self) -> Vec<CapturedLoad> {
        self.loads.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Content loaded for `source`, if any
    pub fn content_of(&self, source: &InputSpec) -> Option<Vec<u8>> {
        self.loads()
            .into_iter()
            .find(|l| &l.source == source)
            .map(|l| l.content)
    }

    /// Total rows across all loads
    pub fn total_rows(&self) -> u64 {
        self.loads().iter().map(|l| l.rows).sum()
    }
}

#[async_trait(?Send)]
impl DataSink for MemorySink {
    async fn load(&self, artifact: &SpoolArtifact) -> SinkResult<()> {
        let content = artifact
            .read()
            .map_err(|e| SinkError::IoError(format!("{}: {}", artifact.location().display(), e)))?;

        let mut loads = self
            .loads
            .lock()
            .map_err(|e| SinkError::LoadFailed(format!("Lock error: {}", e)))?;
        loads.push(CapturedLoad {
            source: artifact.source().clone(),
            rows: artifact.rows(),
            content,
        });
        Ok(())
    }

    async fn health_check(&self) -> SinkResult<bool> {
        Ok(true)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn close(&self) -> SinkResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::TabularRow;
    use crate::pipeline::spool::SpoolWriter;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_captures_content() {
        let dir = TempDir::new().unwrap();
        let source = InputSpec::new("a.log");
        let mut writer = SpoolWriter::create(source.clone(), Some(dir.path())).unwrap();
        writer.write_row(&TabularRow::from("x,1")).unwrap();
        writer.write_row(&TabularRow::from("y,2")).unwrap();
        let artifact = writer.finish().unwrap();

        let sink = MemorySink::new();
        sink.load(&artifact).await.unwrap();

        assert_eq!(sink.backend_type(), "memory");
        assert_eq!(sink.total_rows(), 2);
        assert_eq!(sink.content_of(&source).unwrap(), b"x,1\ny,2\n");
        assert!(sink.content_of(&InputSpec::new("b.log")).is_none());
    }
}
