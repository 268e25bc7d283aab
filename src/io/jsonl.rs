//! JSON Lines (JSONL) record source.
//!
//! Each non-empty line is deserialised into `T` with Serde. Empty and whitespace-only lines
//! are skipped. Line framing, including sub-range ownership, comes from
//! [`LineReader`](crate::io::lines::LineReader), so large uncompressed JSONL files split
//! into ranges like any other line-based file.
//!
//! ```no_run
//! use readall::io::glob::match_files;
//! use readall::io::jsonl::JsonlFactory;
//! use readall::{ReadAll, ReadAllConfig};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Event { id: u64, kind: String }
//!
//! # fn main() -> anyhow::Result<()> {
//! let read = ReadAll::new(JsonlFactory::<Event>::new(), ReadAllConfig::default())?;
//! let events = read.collect(match_files("events/*.jsonl.gz")?)?;
//! # Ok(())
//! # }
//! ```

use crate::io::lines::LineReader;
use crate::source::{RecordSource, RecordSourceFactory, SourceInput};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Factory for [`JsonlSource`]s decoding `T`.
pub struct JsonlFactory<T> {
    _t: PhantomData<fn() -> T>,
}

impl<T> JsonlFactory<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { _t: PhantomData }
    }
}

impl<T> Default for JsonlFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonlFactory<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> RecordSourceFactory<T> for JsonlFactory<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn supports_subrange(&self) -> bool {
        true
    }

    fn create(&self, path: &str, input: SourceInput) -> Result<Box<dyn RecordSource<T>>> {
        Ok(Box::new(JsonlSource::<T> {
            path: path.to_string(),
            lines: LineReader::new(input),
            _t: PhantomData,
        }))
    }
}

/// Reads one JSON document per line.
pub struct JsonlSource<T> {
    path: String,
    lines: LineReader,
    _t: PhantomData<fn() -> T>,
}

impl<T> RecordSource<T> for JsonlSource<T>
where
    T: DeserializeOwned + Send,
{
    fn next_record(&mut self) -> Result<Option<T>> {
        loop {
            let Some((offset, line)) = self
                .lines
                .next_line()
                .with_context(|| format!("read line in {}", self.path))?
            else {
                return Ok(None);
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let value = serde_json::from_slice(line).with_context(|| {
                format!(
                    "parse JSONL at byte {offset} in {}: {}",
                    self.path,
                    String::from_utf8_lossy(line)
                )
            })?;
            return Ok(Some(value));
        }
    }
}
