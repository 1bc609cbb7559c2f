//! Line reassembly for the codex stdout stream.
//!
//! The child writes newline-delimited JSON, but pipe reads hand us arbitrary
//! chunks. [`LineSplitter`] buffers partial lines across chunk boundaries and
//! [`LineReader`] drives it from any [`AsyncRead`].

use std::borrow::Cow;
use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of each read from the underlying pipe.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// One logical line as the child wrote it, minus the `\n` terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    raw: Vec<u8>,
}

impl Line {
    /// Wrap raw bytes, or `None` if they decode to whitespace only.
    fn non_blank(raw: Vec<u8>) -> Option<Self> {
        let line = Self { raw };
        if line.text().trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }

    /// Bytes exactly as received, including any `\r`.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Decoded text with one trailing `\r` removed. Invalid UTF-8 is
    /// replaced with U+FFFD.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        let bytes = self.raw.strip_suffix(b"\r").unwrap_or(&self.raw);
        String::from_utf8_lossy(bytes)
    }
}

/// Incremental splitter turning byte chunks into complete logical lines.
///
/// Splitting happens on raw bytes so that a multi-byte UTF-8 sequence cut in
/// half by a chunk boundary is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    /// Create an empty splitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, in order.
    ///
    /// Whitespace-only lines are dropped. Any unterminated tail stays
    /// buffered until the next chunk or [`finish`](Self::finish).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.buf.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            lines.extend(Line::non_blank(std::mem::take(&mut self.buf)));
        }

        self.buf.extend_from_slice(rest);
        lines
    }

    /// Flush the buffered tail at end of stream.
    ///
    /// Returns the tail only if it holds something other than whitespace.
    pub fn finish(&mut self) -> Option<Line> {
        Line::non_blank(std::mem::take(&mut self.buf))
    }
}

/// Async line source over a child's stdout (or any reader).
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    splitter: LineSplitter,
    ready: VecDeque<Line>,
    chunk: Vec<u8>,
    eof: bool,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            splitter: LineSplitter::new(),
            ready: VecDeque::new(),
            chunk: vec![0; READ_CHUNK_SIZE],
            eof: false,
        }
    }

    /// Wait for the next complete line.
    ///
    /// Returns `Ok(None)` once the reader is exhausted and the trailing
    /// partial line (if any) has been yielded. Cancel safe: dropping the
    /// future between polls loses no data.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if a read fails.
    pub async fn next_line(&mut self) -> std::io::Result<Option<Line>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                self.eof = true;
                self.ready.extend(self.splitter.finish());
            } else {
                self.ready.extend(self.splitter.push(&self.chunk[..n]));
            }
        }
    }
}
