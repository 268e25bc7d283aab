//! Record-source seam between the reading core and format decoders.
//!
//! The core never decodes bytes itself. For every work item it asks a
//! [`RecordSourceFactory`] for a [`RecordSource`] bound to the file, hands it the file's
//! (already decompressed) bytes as a [`SourceInput`], and pulls records until the source
//! is exhausted.
//!
//! ## Sub-range reads
//!
//! A factory that returns `true` from [`RecordSourceFactory::supports_subrange`] may be
//! given a restricted input: the reader is positioned at `range.start()` and the source
//! must yield exactly the records that *belong* to the range. Sources decide ownership for
//! records straddling a boundary; every record must belong to exactly one range of a
//! partition. Restricted inputs are only produced for uncompressed files.
//!
//! Factories without the capability always receive the whole file from offset 0.

use crate::file::ByteRange;
use std::io::BufRead;

/// Bytes handed to a record source.
pub struct SourceInput {
    reader: Box<dyn BufRead + Send>,
    offset: u64,
    range: Option<ByteRange>,
}

impl SourceInput {
    /// Input covering the whole file from offset 0.
    pub fn whole(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            offset: 0,
            range: None,
        }
    }

    /// Input positioned at `range.start()` of an uncompressed file.
    pub fn restricted(reader: impl BufRead + Send + 'static, range: ByteRange) -> Self {
        Self {
            reader: Box::new(reader),
            offset: range.start(),
            range: Some(range),
        }
    }

    /// Absolute file offset the reader is positioned at.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The range records must belong to, or `None` for the whole file.
    #[must_use]
    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }

    #[must_use]
    pub fn into_reader(self) -> Box<dyn BufRead + Send> {
        self.reader
    }

    /// Split into reader, offset and range.
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn BufRead + Send>, u64, Option<ByteRange>) {
        (self.reader, self.offset, self.range)
    }
}

/// A stateful, non-restartable reader of decoded records.
pub trait RecordSource<T>: Send {
    /// Pull the next record. `Ok(None)` means the source is exhausted.
    ///
    /// # Errors
    /// Any decoding or I/O failure. The source is not polled again afterwards.
    fn next_record(&mut self) -> anyhow::Result<Option<T>>;

    /// Release anything the source holds. Called exactly once, whether reading finished,
    /// failed, or was abandoned.
    ///
    /// # Errors
    /// Failures while releasing resources; routed through the exception policy when
    /// reading otherwise succeeded.
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds a [`RecordSource`] for a file path.
pub trait RecordSourceFactory<T>: Send + Sync {
    /// Whether sources can be restricted to a byte sub-range of a file.
    fn supports_subrange(&self) -> bool {
        false
    }

    /// Bind a new source to `path`, reading from `input`.
    ///
    /// # Errors
    /// Failures constructing the source (e.g. a malformed header).
    fn create(&self, path: &str, input: SourceInput) -> anyhow::Result<Box<dyn RecordSource<T>>>;
}
