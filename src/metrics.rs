//! Counters describing what the range reader did.
//!
//! [`ReadMetrics`] is updated by every [`RangeReader`](crate::RangeReader) sharing it and
//! can be snapshotted at any time, including while a run is in progress. Counters are
//! observational only; nothing in the reading core branches on them.
//!
//! # Example
//!
//! ```no_run
//! use readall::io::lines::TextLinesFactory;
//! use readall::{ReadAll, ReadAllConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let read = ReadAll::new(TextLinesFactory, ReadAllConfig::default())?;
//! let lines = read.collect(readall::io::glob::match_files("logs/*.log")?)?;
//!
//! let snapshot = read.metrics().snapshot();
//! println!("{} records from {} files", snapshot.records, snapshot.sources_opened);
//! read.metrics().save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Thread-safe counters for one or more reading runs.
#[derive(Debug, Default)]
pub struct ReadMetrics {
    items_started: AtomicU64,
    items_completed: AtomicU64,
    items_skipped: AtomicU64,
    items_failed_handled: AtomicU64,
    items_failed_fatal: AtomicU64,
    items_cancelled: AtomicU64,

    sources_opened: AtomicU64,
    open_sources: AtomicUsize,
    peak_open_sources: AtomicUsize,

    records: AtomicU64,
    permit_wait_ns: AtomicU64,
}

/// Point-in-time copy of [`ReadMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMetricsSnapshot {
    pub items_started: u64,
    pub items_completed: u64,
    /// Non-initial ranges of files whose source cannot read sub-ranges.
    pub items_skipped: u64,
    pub items_failed_handled: u64,
    pub items_failed_fatal: u64,
    pub items_cancelled: u64,
    pub sources_opened: u64,
    pub open_sources: usize,
    /// Highest number of sources open at the same time.
    pub peak_open_sources: usize,
    pub records: u64,
    pub permit_wait_ms: u64,
}

impl ReadMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_item_start(&self) {
        self.items_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_item_completed(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_item_skipped(&self) {
        self.items_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_failure(&self, rethrown: bool) {
        if rethrown {
            self.items_failed_fatal.fetch_add(1, Ordering::Relaxed);
        } else {
            self.items_failed_handled.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn on_cancelled(&self) {
        self.items_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_permit_wait(&self, waited: Duration) {
        let ns = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.permit_wait_ns.fetch_add(ns, Ordering::Relaxed);
    }

    pub(crate) fn on_source_open(&self) {
        self.sources_opened.fetch_add(1, Ordering::Relaxed);
        let now = self.open_sources.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open_sources.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn on_source_close(&self) {
        self.open_sources.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn on_record(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    /// Sources open right now.
    #[must_use]
    pub fn open_sources(&self) -> usize {
        self.open_sources.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn peak_open_sources(&self) -> usize {
        self.peak_open_sources.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn snapshot(&self) -> ReadMetricsSnapshot {
        ReadMetricsSnapshot {
            items_started: self.items_started.load(Ordering::Relaxed),
            items_completed: self.items_completed.load(Ordering::Relaxed),
            items_skipped: self.items_skipped.load(Ordering::Relaxed),
            items_failed_handled: self.items_failed_handled.load(Ordering::Relaxed),
            items_failed_fatal: self.items_failed_fatal.load(Ordering::Relaxed),
            items_cancelled: self.items_cancelled.load(Ordering::Relaxed),
            sources_opened: self.sources_opened.load(Ordering::Relaxed),
            open_sources: self.open_sources.load(Ordering::SeqCst),
            peak_open_sources: self.peak_open_sources.load(Ordering::SeqCst),
            records: self.records.load(Ordering::Relaxed),
            permit_wait_ms: self.permit_wait_ns.load(Ordering::Relaxed) / 1_000_000,
        }
    }

    /// Snapshot as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.snapshot()).unwrap_or(Value::Null)
    }

    /// Emit the snapshot as a single `info` event.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            items_started = s.items_started,
            items_completed = s.items_completed,
            items_skipped = s.items_skipped,
            items_failed_handled = s.items_failed_handled,
            items_failed_fatal = s.items_failed_fatal,
            items_cancelled = s.items_cancelled,
            sources_opened = s.sources_opened,
            peak_open_sources = s.peak_open_sources,
            records = s.records,
            permit_wait_ms = s.permit_wait_ms,
            "read metrics"
        );
    }

    /// Save the snapshot to a pretty-printed JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.snapshot())?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}
