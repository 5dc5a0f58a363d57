//! Output sinks for serialized markup.
//!
//! The rewrite driver streams most of a document straight to a
//! [`StreamSink`] and diverts short spans into a [`BufferSink`] when they have
//! to be materialized as a tree first.

use std::io::Write;
use std::path::{Path, PathBuf};

use docweave_shared::{DocweaveError, Result};

/// Destination for serialized markup.
pub trait Sink {
    /// Append raw bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Append UTF-8 text.
    fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// StreamSink
// ---------------------------------------------------------------------------

/// Sink that forwards to any `Write` (usually the staging file).
pub struct StreamSink<W: Write> {
    inner: W,
    label: PathBuf,
    written: u64,
}

impl<W: Write> StreamSink<W> {
    /// `label` names the destination in I/O errors.
    pub fn new(inner: W, label: impl AsRef<Path>) -> Self {
        Self {
            inner,
            label: label.as_ref().to_path_buf(),
            written: 0,
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner
            .flush()
            .map_err(|e| DocweaveError::io(&self.label, e))?;
        Ok(self.inner)
    }
}

impl<W: Write> Sink for StreamSink<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| DocweaveError::io(&self.label, e))?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BufferSink
// ---------------------------------------------------------------------------

/// In-memory sink.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    buf: Vec<u8>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Buffered content as text. Only UTF-8 ever reaches the sink.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf).unwrap_or_default()
    }

    pub fn into_string(self) -> Result<String> {
        String::from_utf8(self.buf)
            .map_err(|e| DocweaveError::parse(format!("buffered markup is not UTF-8: {e}")))
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Sink for BufferSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}
