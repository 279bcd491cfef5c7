//! File reader
//!
//! Streams one input file into its handoff queue, one line at a time, so memory use
//! per file is bounded by the longest line rather than the file size.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Handoff, InputSpec, PipelineError, RawLine, Stage};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Read `file` and push its lines into `queue`.
///
/// Runs on a blocking thread. The queue is closed when this returns, whatever the
/// outcome, because `queue` is dropped. [`Handoff::End`] is only sent after the
/// whole file was read, so the transformer can tell a complete input from an
/// aborted one.
///
/// Returns the number of lines read.
pub fn read_lines(
    file: &InputSpec,
    queue: mpsc::Sender<Handoff>,
    cancel: &CancellationToken,
) -> Result<u64, PipelineError> {
    let handle = File::open(file.path()).map_err(|e| PipelineError::Open {
        file: file.clone(),
        cause: e.to_string(),
    })?;
    let mut lines = UniversalLines::new(BufReader::with_capacity(READ_BUFFER_SIZE, handle));

    let mut text = Vec::new();
    let mut number: u64 = 0;

    while lines.next_line(&mut text).map_err(|e| PipelineError::Read {
        file: file.clone(),
        cause: e.to_string(),
    })? {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                file: file.clone(),
                stage: Stage::Reader,
            });
        }

        number += 1;
        let raw = RawLine {
            text: std::mem::take(&mut text),
            source: file.clone(),
            number,
        };
        if queue.blocking_send(Handoff::Line(raw)).is_err() {
            // The transformer gave up and reported why
            debug!(file = %file, "transformer stopped, no more lines sent");
            return Ok(number - 1);
        }
    }

    if queue.blocking_send(Handoff::End).is_err() {
        debug!(file = %file, "transformer stopped before end of input");
    }

    Ok(number)
}

/// Line splitter accepting `\n`, `\r\n` and a lone `\r` as line endings
///
/// A line is complete as soon as its terminator byte was read, so a `\r` ended
/// line never waits for the next byte. A final line without a terminator is still
/// a line.
pub struct UniversalLines<R> {
    inner: R,
    /// The previous line ended with `\r`; a `\n` right after it belongs to it
    skip_lf: bool,
}

impl<R: BufRead> UniversalLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            skip_lf: false,
        }
    }

    /// Read the next line into `line`, without its terminator.
    ///
    /// Returns `false` at end of input.
    pub fn next_line(&mut self, line: &mut Vec<u8>) -> io::Result<bool> {
        line.clear();
        let mut started = false;

        loop {
            let buf = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if buf.is_empty() {
                return Ok(started);
            }

            if self.skip_lf {
                self.skip_lf = false;
                if buf[0] == b'\n' {
                    self.inner.consume(1);
                    continue;
                }
            }
            started = true;

            match buf.iter().position(|b| matches!(b, b'\r' | b'\n')) {
                Some(end) => {
                    line.extend_from_slice(&buf[..end]);
                    self.skip_lf = buf[end] == b'\r';
                    self.inner.consume(end + 1);
                    return Ok(true);
                }
                None => {
                    let len = buf.len();
                    line.extend_from_slice(buf);
                    self.inner.consume(len);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn lines(input: &[u8]) -> Vec<Vec<u8>> {
        // Tiny buffer so terminators straddle buffer boundaries
        let mut reader = UniversalLines::new(BufReader::with_capacity(2, input));
        let mut out = Vec::new();
        let mut line = Vec::new();
        while reader.next_line(&mut line).unwrap() {
            out.push(line.clone());
        }
        out
    }

    #[test]
    fn test_universal_lines() {
        assert_eq!(lines(b"abc\n"), vec![b"abc".to_vec()]);
        assert_eq!(lines(b"abc\r\n"), vec![b"abc".to_vec()]);
        assert_eq!(lines(b"abc"), vec![b"abc".to_vec()]);
        assert_eq!(lines(b"abc\r"), vec![b"abc".to_vec()]);
        assert_eq!(lines(b"a\rb\n"), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(lines(b"\n"), vec![Vec::<u8>::new()]);
        assert_eq!(lines(b"a\r\r\n"), vec![b"a".to_vec(), Vec::new()]);
        assert_eq!(lines(b"a\n\r\n"), vec![b"a".to_vec(), Vec::new()]);
        assert!(lines(b"").is_empty());
    }

    fn drain(mut rx: mpsc::Receiver<Handoff>) -> (Vec<Vec<u8>>, bool) {
        let mut out = Vec::new();
        let mut ended = false;
        while let Some(item) = rx.blocking_recv() {
            match item {
                Handoff::Line(line) => out.push(line.text),
                Handoff::End => ended = true,
            }
        }
        (out, ended)
    }

    #[test]
    fn test_read_lines_mixed_endings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.log");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"one\r\ntwo\nthree\rfour").unwrap();

        let (tx, rx) = mpsc::channel(16);
        let count = read_lines(&InputSpec::new(&path), tx, &CancellationToken::new()).unwrap();
        assert_eq!(count, 4);

        let (out, ended) = drain(rx);
        assert!(ended);
        assert_eq!(
            out,
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec(), b"four".to_vec()]
        );
    }

    #[test]
    fn test_line_numbers_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("n.log");
        std::fs::write(&path, "a\nb\nc\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        read_lines(&InputSpec::new(&path), tx, &CancellationToken::new()).unwrap();

        let mut numbers = Vec::new();
        while let Some(Handoff::Line(line)) = rx.blocking_recv() {
            numbers.push(line.number);
        }
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_file_closes_queue_without_end() {
        let dir = TempDir::new().unwrap();
        let spec = InputSpec::new(dir.path().join("missing.log"));

        let (tx, rx) = mpsc::channel(16);
        let err = read_lines(&spec, tx, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Open { .. }));
        assert_eq!(err.file(), &spec);

        let (out, ended) = drain(rx);
        assert!(out.is_empty());
        assert!(!ended);
    }

    #[test]
    fn test_cancelled_before_first_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.log");
        std::fs::write(&path, "a\nb\n").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, rx) = mpsc::channel(16);
        let err = read_lines(&InputSpec::new(&path), tx, &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.stage(), Stage::Reader);

        let (out, ended) = drain(rx);
        assert!(out.is_empty());
        assert!(!ended);
    }

    #[test]
    fn test_stops_when_transformer_is_gone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.log");
        std::fs::write(&path, "a\nb\nc\n").unwrap();

        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let count = read_lines(&InputSpec::new(&path), tx, &CancellationToken::new()).unwrap();
        assert_eq!(count, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_cr_lines_arrive_before_end_of_input() {
        let dir = TempDir::new().unwrap();
        let fifo = dir.path().join("cr.fifo");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success());

        // The writer keeps the pipe open until told otherwise, so no EOF arrives
        let (close_tx, close_rx) = std::sync::mpsc::channel::<()>();
        let writer = {
            let fifo = fifo.clone();
            std::thread::spawn(move || {
                let mut pipe = std::fs::OpenOptions::new().write(true).open(&fifo).unwrap();
                pipe.write_all(b"first\rsecond\r").unwrap();
                pipe.flush().unwrap();
                let _ = close_rx.recv();
            })
        };

        let (tx, mut rx) = mpsc::channel(16);
        let reader = {
            let spec = InputSpec::new(&fifo);
            std::thread::spawn(move || read_lines(&spec, tx, &CancellationToken::new()))
        };

        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let collector = std::thread::spawn(move || {
            while let Some(item) = rx.blocking_recv() {
                if let Handoff::Line(line) = item {
                    let _ = seen_tx.send(line.text);
                }
            }
        });

        let timeout = std::time::Duration::from_secs(5);
        assert_eq!(seen_rx.recv_timeout(timeout).unwrap(), b"first");
        assert_eq!(seen_rx.recv_timeout(timeout).unwrap(), b"second");

        close_tx.send(()).unwrap();
        writer.join().unwrap();
        assert_eq!(reader.join().unwrap().unwrap(), 2);
        collector.join().unwrap();
    }
}
