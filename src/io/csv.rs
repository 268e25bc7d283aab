//! CSV record source.
//!
//! Rows are deserialised with Serde using `T: DeserializeOwned`. CSV cannot be split by
//! byte offset safely (quoted fields may contain newlines, and only the first range would
//! see the header), so this factory reads whole files only. Split planning collapses each
//! CSV file to a single work item.
//!
//! * If `has_headers` is `true`, the first row is treated as a header and used to map
//!   columns to fields by name.
//! * Errors are annotated with the row's line number.

use crate::source::{RecordSource, RecordSourceFactory, SourceInput};
use anyhow::{Context, Result};
use csv::{Reader, ReaderBuilder, StringRecord};
use serde::de::DeserializeOwned;
use std::io::BufRead;
use std::marker::PhantomData;

/// Factory for CSV sources decoding `T`.
pub struct CsvFactory<T> {
    has_headers: bool,
    delimiter: u8,
    _t: PhantomData<fn() -> T>,
}

impl<T> CsvFactory<T> {
    /// Comma-delimited, with or without a header row.
    #[must_use]
    pub const fn new(has_headers: bool) -> Self {
        Self {
            has_headers,
            delimiter: b',',
            _t: PhantomData,
        }
    }

    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl<T> RecordSourceFactory<T> for CsvFactory<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn create(&self, path: &str, input: SourceInput) -> Result<Box<dyn RecordSource<T>>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .from_reader(input.into_reader());
        let headers = if self.has_headers {
            Some(
                reader
                    .headers()
                    .with_context(|| format!("read CSV header of {path}"))?
                    .clone(),
            )
        } else {
            None
        };
        Ok(Box::new(CsvSource::<T> {
            path: path.to_string(),
            reader,
            headers,
            row: StringRecord::new(),
            _t: PhantomData,
        }))
    }
}

struct CsvSource<T> {
    path: String,
    reader: Reader<Box<dyn BufRead + Send>>,
    headers: Option<StringRecord>,
    row: StringRecord,
    _t: PhantomData<fn() -> T>,
}

impl<T> RecordSource<T> for CsvSource<T>
where
    T: DeserializeOwned + Send,
{
    fn next_record(&mut self) -> Result<Option<T>> {
        let more = self
            .reader
            .read_record(&mut self.row)
            .with_context(|| format!("read CSV row in {}", self.path))?;
        if !more {
            return Ok(None);
        }
        let line = self.row.position().map_or(0, csv::Position::line);
        let value = self
            .row
            .deserialize(self.headers.as_ref())
            .with_context(|| format!("parse CSV row at line {line} in {}", self.path))?;
        Ok(Some(value))
    }
}
