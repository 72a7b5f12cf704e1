//! Spill Buffer (component C1).
//!
//! A scoped, single-writer/single-reader append buffer that silently
//! promotes from an in-memory `Vec<u8>` to a temp file once the running
//! total crosses a configured threshold. Used by `object_backend` to buffer
//! an upload body whose size isn't known up front without risking unbounded
//! memory growth
//!
//! Nothing elsewhere in this workspace streams whole files straight from
//! disk the way this has to cope with unbounded upload bodies; the
//! promote-on-threshold policy and the one-way-until-reset state machine
//! are built directly against that requirement.

use camino::Utf8PathBuf;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write as _};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum SpillError {
    #[error("spill buffer is closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl SpillError {
    pub fn kind(&self) -> common::ErrorKind {
        match self {
            SpillError::Closed => common::ErrorKind::Closed,
            SpillError::Io(_) => common::ErrorKind::Unavailable,
        }
    }
}

type Result<T> = std::result::Result<T, SpillError>;

enum Location {
    Memory(Vec<u8>),
    File(NamedTempFile),
}

struct Inner {
    location: Location,
    total: u64,
    closed: bool,
}

/// A seekable view over everything written to a [`SpillBuffer`] so far.
pub enum SpillReader {
    Memory(Cursor<Vec<u8>>),
    File(File),
}

impl Read for SpillReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SpillReader::Memory(c) => c.read(buf),
            SpillReader::File(f) => f.read(buf),
        }
    }
}

impl Seek for SpillReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            SpillReader::Memory(c) => c.seek(pos),
            SpillReader::File(f) => f.seek(pos),
        }
    }
}

pub struct SpillBuffer {
    threshold: u64,
    temp_dir: Utf8PathBuf,
    temp_prefix: String,
    inner: Mutex<Inner>,
}

impl SpillBuffer {
    pub fn new(threshold: u64, temp_dir: impl Into<Utf8PathBuf>, temp_prefix: impl Into<String>) -> Self {
        Self {
            threshold,
            temp_dir: temp_dir.into(),
            temp_prefix: temp_prefix.into(),
            inner: Mutex::new(Inner {
                location: Location::Memory(Vec::new()),
                total: 0,
                closed: false,
            }),
        }
    }

    /// Default 16 MiB threshold
    pub fn with_default_threshold(temp_dir: impl Into<Utf8PathBuf>) -> Self {
        Self::new(16 * 1024 * 1024, temp_dir, "spillbuffer-")
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(SpillError::Closed);
        }
        let new_total = inner.total + bytes.len() as u64;

        match &mut inner.location {
            Location::Memory(buf) if new_total <= self.threshold => {
                buf.extend_from_slice(bytes);
            }
            Location::Memory(buf) => {
                debug!(total = new_total, threshold = self.threshold, "promoting to temp file");
                let mut tmp = tempfile::Builder::new()
                    .prefix(&self.temp_prefix)
                    .tempfile_in(&self.temp_dir)?;
                tmp.write_all(buf)?;
                tmp.write_all(bytes)?;
                inner.location = Location::File(tmp);
            }
            Location::File(tmp) => {
                // Writers always append; re-seek to end in case a reader
                // moved the shared cursor.
                tmp.as_file_mut().seek(SeekFrom::End(0))?;
                tmp.write_all(bytes)?;
            }
        }
        inner.total = new_total;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap().total
    }

    pub fn in_memory(&self) -> bool {
        matches!(self.inner.lock().unwrap().location, Location::Memory(_))
    }

    /// Opens a read view over all bytes written so far, seeked to offset 0.
    pub fn read_seeker(&self) -> Result<SpillReader> {
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(SpillError::Closed);
        }
        match &inner.location {
            Location::Memory(buf) => Ok(SpillReader::Memory(Cursor::new(buf.clone()))),
            Location::File(tmp) => {
                let mut file = tmp.reopen()?;
                file.seek(SeekFrom::Start(0))?;
                Ok(SpillReader::File(file))
            }
        }
    }

    /// Alias kept for callers that think in terms of "give me a reader"
    /// rather than "give me a seeker" — same object either way.
    pub fn reader(&self) -> Result<SpillReader> {
        self.read_seeker()
    }

    /// Materializes the full buffer into memory. Discouraged once the state
    /// has promoted to disk (defeats the purpose of spilling).
    pub fn bytes(&self) -> Result<Vec<u8>> {
        let mut reader = self.read_seeker()?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    pub fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(SpillError::Closed);
        }
        inner.location = Location::Memory(Vec::new());
        inner.total = 0;
        Ok(())
    }

    /// Releases resources, removing any temp file on every exit path.
    /// Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.location = Location::Memory(Vec::new());
        inner.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(threshold: u64) -> SpillBuffer {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir for the duration of the test; fine for a unit test.
        let path: Utf8PathBuf = Utf8PathBuf::from_path_buf(dir.into_path()).unwrap();
        SpillBuffer::new(threshold, path, "test-")
    }

    #[test]
    fn stays_in_memory_under_threshold() {
        let b = buf(16);
        b.write(b"hello").unwrap();
        assert!(b.in_memory());
        assert_eq!(b.size(), 5);
    }

    #[test]
    fn promotes_at_threshold() {
        let b = buf(10);
        b.write(&[0u8; 9]).unwrap();
        assert!(b.in_memory());
        b.write(&[0u8; 2]).unwrap();
        assert!(!b.in_memory());
        assert_eq!(b.size(), 11);
    }

    #[test]
    fn twenty_one_mib_writes_promote_after_sixteen() {
        // Twenty 1-MiB writes over a 16 MiB threshold.
        let b = buf(16 * 1024 * 1024);
        let chunk = vec![0xABu8; 1024 * 1024];
        for i in 0..20 {
            b.write(&chunk).unwrap();
            if i < 16 {
                assert!(b.in_memory(), "write {i} should still be in memory");
            }
        }
        assert!(!b.in_memory());
        let all = b.bytes().unwrap();
        assert_eq!(all.len(), 20 * 1024 * 1024);
    }

    #[test]
    fn reader_yields_exact_concatenation() {
        let b = buf(4);
        b.write(b"ab").unwrap();
        b.write(b"cd").unwrap();
        b.write(b"ef").unwrap();
        let mut r = b.reader().unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn reset_returns_to_memory_with_zero_size() {
        let b = buf(4);
        b.write(b"abcdef").unwrap();
        assert!(!b.in_memory());
        b.reset().unwrap();
        assert!(b.in_memory());
        assert_eq!(b.size(), 0);
    }

    #[test]
    fn writes_after_close_fail() {
        let b = buf(4);
        b.close().unwrap();
        let err = b.write(b"x").unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::Closed);
    }
}
