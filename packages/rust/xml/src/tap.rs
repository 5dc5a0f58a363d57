//! Raw byte capture for the document prolog.
//!
//! The reader hands out a DOCTYPE body with its keyword and the whitespace
//! after it already stripped. [`PrologTap`] keeps the bytes consumed before
//! the root element so the original spelling can be written back.

use std::io::{self, BufRead, Read};

/// `BufRead` adapter recording consumed bytes until [`PrologTap::stop`].
pub struct PrologTap<R> {
    inner: R,
    recorded: Vec<u8>,
    recording: bool,
}

impl<R: BufRead> PrologTap<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
            recording: true,
        }
    }

    /// Hand out what was recorded since the last call.
    pub fn take_recorded(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.recorded)
    }

    /// Stop recording; the prolog is over.
    pub fn stop(&mut self) {
        if self.recording {
            self.recording = false;
            self.recorded = Vec::new();
        }
    }
}

impl<R: BufRead> Read for PrologTap<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if self.recording {
            self.recorded.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }
}

impl<R: BufRead> BufRead for PrologTap<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if self.recording {
            // Already buffered: no further I/O happens here.
            if let Ok(available) = self.inner.fill_buf() {
                let n = amt.min(available.len());
                self.recorded.extend_from_slice(&available[..n]);
            }
        }
        self.inner.consume(amt);
    }
}

/// The `<!DOCTYPE` keyword plus trailing whitespace, as spelled in `raw`.
pub fn doctype_prefix(raw: &[u8]) -> Option<&[u8]> {
    const KEYWORD: &[u8] = b"<!DOCTYPE";
    let start = raw
        .windows(KEYWORD.len())
        .rposition(|w| w.eq_ignore_ascii_case(KEYWORD))?;
    let mut end = start + KEYWORD.len();
    while end < raw.len() && raw[end].is_ascii_whitespace() {
        end += 1;
    }
    Some(&raw[start..end])
}
