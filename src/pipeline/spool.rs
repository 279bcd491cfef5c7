//! Spool artifacts
//!
//! A spool artifact is a temporary file holding the transformed rows of one input,
//! newline terminated, ready for a bulk load. [`SpoolWriter`] is the exclusive write
//! side owned by a transformer; [`SpoolArtifact`] is the finalized, read-only handle
//! that travels over the completion queue. Dropping either one deletes the file.

use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};

use super::InputSpec;
use crate::extract::TabularRow;

const SPOOL_PREFIX: &str = "textsql-";
const SPOOL_SUFFIX: &str = ".rows";

/// Write side of a spool artifact
pub struct SpoolWriter {
    source: InputSpec,
    file: BufWriter<NamedTempFile>,
    rows: u64,
    bytes: u64,
}

impl SpoolWriter {
    /// Allocate a new uniquely named artifact.
    ///
    /// Uses `dir` when given, otherwise the platform temp directory.
    pub fn create(source: InputSpec, dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SPOOL_PREFIX).suffix(SPOOL_SUFFIX);

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        Ok(Self {
            source,
            file: BufWriter::new(file),
            rows: 0,
            bytes: 0,
        })
    }

    /// Append one row followed by a newline
    pub fn write_row(&mut self, row: &TabularRow) -> io::Result<()> {
        self.file.write_all(row.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.rows += 1;
        self.bytes += row.len() as u64 + 1;
        Ok(())
    }

    /// Number of rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Location of the backing file
    pub fn location(&self) -> &Path {
        self.file.get_ref().path()
    }

    /// Flush and close the file, returning the publishable handle.
    ///
    /// On failure the partially written file is removed.
    pub fn finish(self) -> io::Result<SpoolArtifact> {
        let file = self.file.into_inner().map_err(|e| e.into_error())?;
        file.as_file().sync_data()?;

        Ok(SpoolArtifact {
            source: self.source,
            path: file.into_temp_path(),
            rows: self.rows,
            bytes: self.bytes,
        })
    }
}

impl fmt::Debug for SpoolWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpoolWriter")
            .field("source", &self.source)
            .field("location", &self.location())
            .field("rows", &self.rows)
            .finish()
    }
}

/// A finalized artifact.
///
/// Owns the backing file: whoever holds it decides whether the file is deleted
/// (drop) or kept ([`SpoolArtifact::keep`]).
#[derive(Debug)]
pub struct SpoolArtifact {
    source: InputSpec,
    path: TempPath,
    rows: u64,
    bytes: u64,
}

impl SpoolArtifact {
    /// Input file the rows came from
    pub fn source(&self) -> &InputSpec {
        &self.source
    }

    /// Location handle passed to the sink
    pub fn location(&self) -> &Path {
        &self.path
    }

    /// Number of rows in the artifact
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Size of the artifact in bytes
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Read the whole artifact back
    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// Keep the backing file past the lifetime of the handle
    pub fn keep(self) -> io::Result<PathBuf> {
        self.path.keep().map_err(|e| e.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_finish() {
        let dir = TempDir::new().unwrap();
        let mut writer = SpoolWriter::create(InputSpec::new("in.log"), Some(dir.path())).unwrap();
        writer.write_row(&TabularRow::from("a,1")).unwrap();
        writer.write_row(&TabularRow::from("b,2")).unwrap();
        assert!(writer.location().starts_with(dir.path()));

        let artifact = writer.finish().unwrap();
        assert_eq!(artifact.rows(), 2);
        assert_eq!(artifact.bytes(), 8);
        assert_eq!(artifact.read().unwrap(), b"a,1\nb,2\n");
        assert_eq!(artifact.source(), &InputSpec::new("in.log"));
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = TempDir::new().unwrap();
        let writer = SpoolWriter::create(InputSpec::new("in.log"), Some(dir.path())).unwrap();
        let artifact = writer.finish().unwrap();
        let location = artifact.location().to_path_buf();
        assert!(location.exists());

        drop(artifact);
        assert!(!location.exists());
    }

    #[test]
    fn test_abandoned_writer_removes_file() {
        let dir = TempDir::new().unwrap();
        let mut writer = SpoolWriter::create(InputSpec::new("in.log"), Some(dir.path())).unwrap();
        writer.write_row(&TabularRow::from("partial")).unwrap();
        let location = writer.location().to_path_buf();

        drop(writer);
        assert!(!location.exists());
    }

    #[test]
    fn test_keep_persists_file() {
        let dir = TempDir::new().unwrap();
        let mut writer = SpoolWriter::create(InputSpec::new("in.log"), Some(dir.path())).unwrap();
        writer.write_row(&TabularRow::from("x")).unwrap();

        let kept = writer.finish().unwrap().keep().unwrap();
        assert!(kept.exists());
        assert_eq!(fs::read(&kept).unwrap(), b"x\n");
    }

    #[test]
    fn test_unique_names() {
        let dir = TempDir::new().unwrap();
        let a = SpoolWriter::create(InputSpec::new("same.log"), Some(dir.path())).unwrap();
        let b = SpoolWriter::create(InputSpec::new("same.log"), Some(dir.path())).unwrap();
        assert_ne!(a.location(), b.location());
    }
}
