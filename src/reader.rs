//! Reading one work item under a concurrency permit.
//!
//! [`RangeReader::read`] turns a [`WorkItem`] into a lazy iterator of records. Nothing
//! happens until the first pull; then the item moves through
//!
//! ```text
//! Pending -> PermitAcquired -> Open -> Reading -> Completed
//!                                              -> FailedHandled
//!                                              -> FailedFatal
//!                                              -> Cancelled
//! ```
//!
//! While an item is open its record source and its permit live in one value. Dropping
//! that value closes the source and then releases the permit, so cleanup happens on every
//! exit path: exhaustion, a handled or rethrown failure, cancellation, the consumer
//! dropping the iterator early, or a panic unwinding through either side.
//!
//! ```
//! use readall::io::fs::MemoryFileSystem;
//! use readall::io::lines::TextLinesFactory;
//! use readall::{ConcurrencyLimiter, FileHandle, RangeReader, WorkItem};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let fs = MemoryFileSystem::new();
//! let size = fs.insert("mem/a.txt", "alpha\nbeta\n");
//!
//! let reader = RangeReader::new(TextLinesFactory)
//!     .with_file_system(Arc::new(fs))
//!     .with_limiter(ConcurrencyLimiter::new(1));
//!
//! let item = WorkItem::whole_file(FileHandle::new("mem/a.txt", size));
//! let lines: Vec<String> = reader.read(item).collect::<Result<_, _>>()?;
//! assert_eq!(lines, vec!["alpha", "beta"]);
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancelToken;
use crate::error::{IngestError, IngestResult};
use crate::file::WorkItem;
use crate::io::fs::{FileSystem, LocalFileSystem};
use crate::limiter::{ConcurrencyLimiter, Permit};
use crate::metrics::ReadMetrics;
use crate::policy::{AlwaysRethrow, ExceptionPolicy};
use crate::source::{RecordSource, RecordSourceFactory, SourceInput};
use anyhow::Context;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Terminal state of a work item that did not fail the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The source was read to the end.
    Completed,
    /// A failure was swallowed by the exception policy; earlier records were kept.
    FailedHandled,
    /// A non-initial range of a file whose source cannot read sub-ranges. Another item
    /// reads the whole file, so this one yields nothing.
    Skipped,
}

/// What [`RangeReader::read_into`] did with one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    pub status: ReadStatus,
    pub records: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Open,
    Read,
}

/// Reads work items through a record-source factory, one permit per open file.
pub struct RangeReader<T> {
    factory: Arc<dyn RecordSourceFactory<T>>,
    fs: Arc<dyn FileSystem>,
    policy: Arc<dyn ExceptionPolicy>,
    limiter: Arc<ConcurrencyLimiter>,
    metrics: Arc<ReadMetrics>,
    cancel: CancelToken,
}

impl<T> Clone for RangeReader<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            fs: Arc::clone(&self.fs),
            policy: Arc::clone(&self.policy),
            limiter: Arc::clone(&self.limiter),
            metrics: Arc::clone(&self.metrics),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Send + 'static> RangeReader<T> {
    /// A reader over the local disk using the process-wide limiter and the
    /// always-rethrow policy.
    pub fn new(factory: impl RecordSourceFactory<T> + 'static) -> Self {
        Self::from_shared(Arc::new(factory))
    }

    /// Like [`new`](Self::new) for a factory that is already shared.
    pub fn from_shared(factory: Arc<dyn RecordSourceFactory<T>>) -> Self {
        Self {
            factory,
            fs: Arc::new(LocalFileSystem),
            policy: Arc::new(AlwaysRethrow),
            limiter: ConcurrencyLimiter::global(),
            metrics: Arc::new(ReadMetrics::new()),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    #[must_use]
    pub fn with_exception_policy(mut self, policy: Arc<dyn ExceptionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<ConcurrencyLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ReadMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ReadMetrics> {
        &self.metrics
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Lazily read one work item.
    ///
    /// The iterator yields records in source order. A rethrown failure or a cancellation
    /// is yielded once as `Err`, after the source has been closed and the permit released;
    /// the iterator then ends.
    pub fn read(&self, item: WorkItem) -> RangeRecords<T> {
        RangeRecords {
            reader: self.clone(),
            item,
            phase: Phase::Pending,
            records: 0,
        }
    }

    /// Read one work item, pushing each record into `sink` as it is produced.
    ///
    /// # Errors
    /// A failure the exception policy rethrew, or [`IngestError::Cancelled`].
    pub fn read_into(&self, item: WorkItem, mut sink: impl FnMut(T)) -> IngestResult<ReadOutcome> {
        let mut records = self.read(item);
        for record in records.by_ref() {
            sink(record?);
        }
        Ok(ReadOutcome {
            status: records.status().unwrap_or(ReadStatus::Completed),
            records: records.records(),
        })
    }

    /// Whether the factory can read a byte range on its own.
    pub(crate) fn supports_subrange(&self) -> bool {
        self.factory.supports_subrange()
    }

    /// Whether the source for `item` can be restricted to its range.
    fn can_restrict(&self, item: &WorkItem) -> bool {
        self.factory.supports_subrange() && !item.file.compression().is_compressed()
    }

    fn open_source(&self, item: &WorkItem) -> anyhow::Result<Box<dyn RecordSource<T>>> {
        let file = &item.file;
        let mut raw = self.fs.open(file.path())?;
        let input = if !item.is_whole_file() && self.can_restrict(item) {
            raw.seek(SeekFrom::Start(item.range.start()))
                .with_context(|| format!("seek {} to {}", file.path(), item.range.start()))?;
            SourceInput::restricted(BufReader::new(raw), item.range)
        } else {
            let raw: Box<dyn Read + Send> = Box::new(raw);
            let plain = file
                .compression()
                .wrap_reader(raw)
                .with_context(|| format!("set up {} decompression", file.compression()))?;
            SourceInput::whole(BufReader::new(plain))
        };
        self.factory.create(file.path(), input)
    }
}

/// A record source together with the permit it was opened under.
///
/// Dropping it closes the source (if still open) and only then releases the permit.
struct OpenSource<T> {
    source: Box<dyn RecordSource<T>>,
    closed: bool,
    metrics: Arc<ReadMetrics>,
    permit: Option<Permit>,
}

impl<T> OpenSource<T> {
    fn close(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.metrics.on_source_close();
        self.source.close()
    }
}

impl<T> Drop for OpenSource<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %format!("{e:#}"), "closing abandoned source failed");
        }
        drop(self.permit.take());
    }
}

enum Phase<T> {
    Pending,
    Reading(OpenSource<T>),
    Done(Option<ReadStatus>),
}

/// Lazy records of one work item. See [`RangeReader::read`].
pub struct RangeRecords<T> {
    reader: RangeReader<T>,
    item: WorkItem,
    phase: Phase<T>,
    records: u64,
}

impl<T: Send + 'static> RangeRecords<T> {
    #[must_use]
    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    /// Records yielded so far.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Terminal status once the iterator has ended without an error.
    #[must_use]
    pub fn status(&self) -> Option<ReadStatus> {
        match self.phase {
            Phase::Done(status) => status,
            Phase::Pending | Phase::Reading(_) => None,
        }
    }

    /// Pending -> Reading, or straight to a terminal phase.
    fn start(&mut self) -> Option<IngestResult<T>> {
        let reader = &self.reader;
        let item = &self.item;
        reader.metrics.on_item_start();

        if !item.is_whole_file() && !reader.can_restrict(item) && item.range.start() > 0 {
            trace!(path = item.file.path(), range = %item.range, "whole-file source, skipping range");
            reader.metrics.on_item_skipped();
            self.phase = Phase::Done(Some(ReadStatus::Skipped));
            return None;
        }

        let waiting = Instant::now();
        let Some(permit) = reader.limiter.acquire_cancellable(&reader.cancel) else {
            return self.cancelled();
        };
        reader.metrics.on_permit_wait(waiting.elapsed());
        trace!(path = item.file.path(), range = %item.range, "permit acquired");

        match reader.open_source(item) {
            Ok(source) => {
                reader.metrics.on_source_open();
                debug!(path = item.file.path(), range = %item.range, "source open");
                self.phase = Phase::Reading(OpenSource {
                    source,
                    closed: false,
                    metrics: Arc::clone(&reader.metrics),
                    permit: Some(permit),
                });
                None
            }
            Err(e) => {
                drop(permit);
                self.fail(Stage::Open, e)
            }
        }
    }

    /// Route a failure through the exception policy. Resources are already released.
    fn fail(&mut self, stage: Stage, cause: anyhow::Error) -> Option<IngestResult<T>> {
        let file = &self.item.file;
        let range = self.item.range;
        let rethrow = self.reader.policy.should_rethrow(file, &range, &cause);
        self.reader.metrics.on_failure(rethrow);
        if rethrow {
            self.phase = Phase::Done(None);
            let path = file.path().to_string();
            return Some(Err(match stage {
                Stage::Open => IngestError::Open { path, range, cause },
                Stage::Read => IngestError::Read { path, range, cause },
            }));
        }
        warn!(
            path = file.path(),
            range = %range,
            records = self.records,
            error = %format!("{cause:#}"),
            "read failure skipped by exception policy"
        );
        self.phase = Phase::Done(Some(ReadStatus::FailedHandled));
        None
    }

    fn cancelled(&mut self) -> Option<IngestResult<T>> {
        // Replacing the phase drops any open source first.
        self.phase = Phase::Done(None);
        self.reader.metrics.on_cancelled();
        debug!(path = self.item.file.path(), records = self.records, "read cancelled");
        Some(Err(IngestError::Cancelled {
            path: self.item.file.path().to_string(),
        }))
    }

    fn finish(&mut self, mut open: OpenSource<T>) -> Option<IngestResult<T>> {
        let closed = open.close();
        drop(open);
        match closed {
            Ok(()) => {
                self.reader.metrics.on_item_completed();
                debug!(path = self.item.file.path(), range = %self.item.range, records = self.records, "source exhausted");
                self.phase = Phase::Done(Some(ReadStatus::Completed));
                None
            }
            Err(e) => self.fail(Stage::Read, e),
        }
    }
}

impl<T: Send + 'static> Iterator for RangeRecords<T> {
    type Item = IngestResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Each arm puts back the phase it leaves the iterator in.
            match std::mem::replace(&mut self.phase, Phase::Done(None)) {
                done @ Phase::Done(_) => {
                    self.phase = done;
                    return None;
                }
                Phase::Pending => {
                    if let Some(out) = self.start() {
                        return Some(out);
                    }
                }
                Phase::Reading(mut open) => {
                    if self.reader.cancel.is_cancelled() {
                        drop(open);
                        return self.cancelled();
                    }
                    match open.source.next_record() {
                        Ok(Some(record)) => {
                            self.phase = Phase::Reading(open);
                            self.records += 1;
                            self.reader.metrics.on_record();
                            return Some(Ok(record));
                        }
                        Ok(None) => return self.finish(open),
                        Err(e) => {
                            // Close and release before the policy sees the error.
                            drop(open);
                            return self.fail(Stage::Read, e);
                        }
                    }
                }
            }
        }
    }
}
