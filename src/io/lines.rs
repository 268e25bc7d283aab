//! Newline-delimited text sources.
//!
//! [`LineReader`] is the shared framing layer for every line-based format. It understands
//! restricted inputs: a line belongs to the range its first byte *follows*, so a range
//! `[from, to)` owns every line starting in `(from, to]`, and the first range also owns
//! the line at offset 0. Concretely, a reader positioned at `from > 0` discards bytes up
//! to and including the next newline, and stops before any line that starts after `to`.
//! Adjacent ranges of a partition therefore read every line exactly once, however lines
//! fall across range boundaries.

use crate::source::{RecordSource, RecordSourceFactory, SourceInput};
use anyhow::{Context, Result};
use std::io::BufRead;

/// Line framing over a [`SourceInput`].
pub struct LineReader {
    reader: Box<dyn BufRead + Send>,
    pos: u64,
    /// Lines starting after this offset belong to the next range.
    last_start: Option<u64>,
    skip_partial: bool,
    buf: Vec<u8>,
}

impl LineReader {
    #[must_use]
    pub fn new(input: SourceInput) -> Self {
        let (reader, offset, range) = input.into_parts();
        Self {
            reader,
            pos: offset,
            last_start: range.map(|r| r.end()),
            skip_partial: offset > 0,
            buf: Vec::with_capacity(256),
        }
    }

    /// Next line without its `\n` / `\r\n` terminator, with the file offset it starts at.
    ///
    /// # Errors
    /// I/O failures from the underlying reader.
    pub fn next_line(&mut self) -> std::io::Result<Option<(u64, &[u8])>> {
        if self.skip_partial {
            self.skip_partial = false;
            self.buf.clear();
            let n = self.reader.read_until(b'\n', &mut self.buf)?;
            self.pos += n as u64;
        }
        if self.last_start.is_some_and(|last| self.pos > last) {
            return Ok(None);
        }

        let start = self.pos;
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.pos += n as u64;

        let mut line = self.buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest;
            if let Some(rest) = line.strip_suffix(b"\r") {
                line = rest;
            }
        }
        Ok(Some((start, line)))
    }
}

/// Yields each line of a file as a `String`. Empty lines are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLinesFactory;

impl RecordSourceFactory<String> for TextLinesFactory {
    fn supports_subrange(&self) -> bool {
        true
    }

    fn create(&self, path: &str, input: SourceInput) -> Result<Box<dyn RecordSource<String>>> {
        Ok(Box::new(TextLinesSource {
            path: path.to_string(),
            lines: LineReader::new(input),
        }))
    }
}

struct TextLinesSource {
    path: String,
    lines: LineReader,
}

impl RecordSource<String> for TextLinesSource {
    fn next_record(&mut self) -> Result<Option<String>> {
        let Some((offset, line)) = self
            .lines
            .next_line()
            .with_context(|| format!("read line in {}", self.path))?
        else {
            return Ok(None);
        };
        let text = std::str::from_utf8(line)
            .with_context(|| format!("line at byte {offset} in {} is not UTF-8", self.path))?;
        Ok(Some(text.to_string()))
    }
}
