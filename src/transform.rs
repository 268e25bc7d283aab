//! The composed transform: list, split, shuffle, then read every work item in parallel.
//!
//! [`ReadAll`] plans work items from a file listing on the calling thread, then hands them
//! to a dedicated `rayon` pool. Workers pull one item at a time; each item holds a permit
//! from the limiter only while its source is open, so the number of open files stays
//! bounded however many workers there are.
//!
//! ```no_run
//! use readall::io::glob::match_files;
//! use readall::io::lines::TextLinesFactory;
//! use readall::{ReadAll, ReadAllConfig, SkipFailures};
//!
//! # fn main() -> anyhow::Result<()> {
//! let read = ReadAll::new(TextLinesFactory, ReadAllConfig::default())?
//!     .with_exception_policy(SkipFailures);
//!
//! for line in read.stream(match_files("logs/**/*.log")?)? {
//!     println!("{}", line?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A failure the exception policy rethrows fails the run. Items already being read finish
//! their current work and release their permits; items not yet started are dropped.

use crate::cancel::CancelToken;
use crate::config::ReadAllConfig;
use crate::error::{IngestError, IngestResult};
use crate::file::{FileHandle, WorkItem};
use crate::io::fs::FileSystem;
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::ReadMetrics;
use crate::policy::ExceptionPolicy;
use crate::reader::{RangeReader, ReadStatus};
use crate::source::RecordSourceFactory;
use crate::split::{clock_seed, plan_work_items, redistribute};
use anyhow::anyhow;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info};

/// Totals for one finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub work_items: u64,
    pub completed: u64,
    pub failed_handled: u64,
    pub skipped: u64,
    pub records: u64,
}

#[derive(Default)]
struct Tally {
    completed: AtomicU64,
    failed_handled: AtomicU64,
    skipped: AtomicU64,
    records: AtomicU64,
}

impl Tally {
    fn add(&self, status: ReadStatus, records: u64) {
        let counter = match status {
            ReadStatus::Completed => &self.completed,
            ReadStatus::FailedHandled => &self.failed_handled,
            ReadStatus::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records, Ordering::Relaxed);
    }

    fn summary(&self, work_items: u64) -> RunSummary {
        RunSummary {
            work_items,
            completed: self.completed.load(Ordering::Relaxed),
            failed_handled: self.failed_handled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
        }
    }
}

/// Read every record of every listed file.
pub struct ReadAll<T> {
    reader: RangeReader<T>,
    config: ReadAllConfig,
}

impl<T> Clone for ReadAll<T> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Send + 'static> ReadAll<T> {
    /// Build the transform over the local disk with the always-rethrow policy.
    ///
    /// The limiter is the process-wide pool of exactly `config.concurrency_limit` permits,
    /// shared with every other transform configured with the same limit.
    ///
    /// # Errors
    /// Returns [`IngestError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        factory: impl RecordSourceFactory<T> + 'static,
        config: ReadAllConfig,
    ) -> IngestResult<Self> {
        config.validate()?;
        let limiter = ConcurrencyLimiter::shared(config.concurrency_limit);
        Ok(Self {
            reader: RangeReader::new(factory).with_limiter(limiter),
            config,
        })
    }

    #[must_use]
    pub fn with_exception_policy(mut self, policy: impl ExceptionPolicy + 'static) -> Self {
        self.reader = self.reader.with_exception_policy(Arc::new(policy));
        self
    }

    /// Use a private limiter instead of the process-wide one.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<ConcurrencyLimiter>) -> Self {
        self.reader = self.reader.with_limiter(limiter);
        self
    }

    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.reader = self.reader.with_file_system(fs);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ReadMetrics>) -> Self {
        self.reader = self.reader.with_metrics(metrics);
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.reader = self.reader.with_cancel_token(cancel);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ReadAllConfig {
        &self.config
    }

    #[must_use]
    pub fn reader(&self) -> &RangeReader<T> {
        &self.reader
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ReadMetrics> {
        self.reader.metrics()
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        self.reader.limiter()
    }

    /// Split the listed files into work items and shuffle them if redistribution is on.
    ///
    /// # Errors
    /// The first listing failure, unchanged.
    pub fn plan<I>(&self, files: I) -> IngestResult<Vec<WorkItem>>
    where
        I: IntoIterator<Item = IngestResult<FileHandle>>,
    {
        let mut items = plan_work_items(
            files,
            self.config.desired_bundle_size_bytes,
            self.reader.supports_subrange(),
        )?;
        if self.config.uses_redistribution {
            let seed = self.config.redistribution_seed.unwrap_or_else(clock_seed);
            debug!(seed, items = items.len(), "redistributing work items");
            redistribute(&mut items, seed);
        }
        Ok(items)
    }

    /// Read every listed file, handing each record to `sink` on a worker thread.
    ///
    /// # Errors
    /// A listing failure, a failure the exception policy rethrew, cancellation, or an
    /// [`IngestError::Execution`] if the worker pool cannot be built.
    pub fn run<I, F>(&self, files: I, sink: F) -> IngestResult<RunSummary>
    where
        I: IntoIterator<Item = IngestResult<FileHandle>>,
        F: Fn(T) + Send + Sync,
    {
        let items = self.plan(files)?;
        self.drive(items, |record| {
            sink(record);
            true
        })
    }

    /// Read every listed file into a vector. Order across work items is unspecified.
    ///
    /// # Errors
    /// As [`run`](Self::run).
    pub fn collect<I>(&self, files: I) -> IngestResult<Vec<T>>
    where
        I: IntoIterator<Item = IngestResult<FileHandle>>,
    {
        let out = Mutex::new(Vec::new());
        self.run(files, |record| {
            out.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(record);
        })?;
        Ok(out.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Read every listed file on a background driver, yielding records as they arrive.
    ///
    /// Listing and planning happen before this returns. At most `channel_capacity` records
    /// are buffered; workers block when the consumer falls behind. Dropping the stream
    /// stops the run once in-flight items notice.
    ///
    /// # Errors
    /// A listing failure or a driver thread that cannot be spawned. Failures while
    /// reading are yielded by the stream.
    pub fn stream<I>(&self, files: I) -> IngestResult<RecordStream<T>>
    where
        I: IntoIterator<Item = IngestResult<FileHandle>>,
    {
        let items = self.plan(files)?;
        let (tx, rx) = mpsc::sync_channel(self.config.channel_capacity);
        let this = self.clone();
        let driver = thread::Builder::new()
            .name("readall-driver".into())
            .spawn(move || {
                let records = tx.clone();
                match this.drive(items, move |record| records.send(Ok(record)).is_ok()) {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        // The consumer may already be gone.
                        let _ = tx.send(Err(e));
                        None
                    }
                }
            })
            .map_err(|e| IngestError::Execution(anyhow::Error::new(e).context("spawn driver")))?;
        Ok(RecordStream {
            rx: Some(rx),
            driver: Some(driver),
            summary: None,
        })
    }

    /// Read `items` on a dedicated pool. `emit` returning false stops the run.
    fn drive<F>(&self, items: Vec<WorkItem>, emit: F) -> IngestResult<RunSummary>
    where
        F: Fn(T) -> bool + Send + Sync,
    {
        let threads = self.config.effective_parallelism();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("readall-worker-{i}"))
            .build()
            .map_err(|e| IngestError::Execution(anyhow!(e).context("build worker pool")))?;

        let work_items = items.len() as u64;
        let tally = Tally::default();
        let stop = AtomicBool::new(false);
        let started = Instant::now();
        info!(
            work_items,
            threads,
            permits = self.limiter().capacity(),
            "reading work items"
        );

        let result = pool.install(|| {
            items
                .into_par_iter()
                .with_max_len(1)
                .try_for_each(|item| -> IngestResult<()> {
                    if stop.load(Ordering::Relaxed) {
                        return Ok(());
                    }
                    let mut records = self.reader.read(item);
                    for record in records.by_ref() {
                        if !emit(record?) {
                            stop.store(true, Ordering::Relaxed);
                            return Ok(());
                        }
                    }
                    if let Some(status) = records.status() {
                        tally.add(status, records.records());
                    }
                    Ok(())
                })
        });

        let summary = tally.summary(work_items);
        match &result {
            Ok(()) => info!(
                completed = summary.completed,
                failed_handled = summary.failed_handled,
                skipped = summary.skipped,
                records = summary.records,
                elapsed_ms = started.elapsed().as_millis() as u64,
                stopped_early = stop.load(Ordering::Relaxed),
                "read finished"
            ),
            Err(e) => info!(
                completed = summary.completed,
                records = summary.records,
                error = %e,
                "read failed"
            ),
        }
        result.map(|()| summary)
    }
}

/// Records of a [`ReadAll::stream`] run, in arrival order.
///
/// A failure is yielded once as `Err` after the records that arrived before the run
/// stopped; the stream then ends.
pub struct RecordStream<T> {
    rx: Option<Receiver<IngestResult<T>>>,
    driver: Option<JoinHandle<Option<RunSummary>>>,
    summary: Option<RunSummary>,
}

impl<T> RecordStream<T> {
    /// Totals of the run, once the stream has been exhausted without an error.
    #[must_use]
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    fn join_driver(&mut self) -> Option<IngestResult<T>> {
        let handle = self.driver.take()?;
        match handle.join() {
            Ok(summary) => {
                self.summary = summary;
                None
            }
            Err(_) => Some(Err(IngestError::Execution(anyhow!(
                "read driver panicked"
            )))),
        }
    }
}

impl<T> Iterator for RecordStream<T> {
    type Item = IngestResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rx.as_ref().map(Receiver::recv) {
            Some(Ok(item)) => return Some(item),
            Some(Err(_)) => self.rx = None,
            None => {}
        }
        self.join_driver()
    }
}

impl<T> Drop for RecordStream<T> {
    fn drop(&mut self) {
        // Disconnect first so blocked workers see a failed send and stop.
        drop(self.rx.take());
        if let Some(handle) = self.driver.take() {
            let _ = handle.join();
        }
    }
}
