//! Record-source factories for exercising the reader.
//!
//! [`InstrumentedFactory`] wraps any factory and counts how many of its sources are open
//! at once; [`FailingFactory`] wraps any factory and injects failures at a chosen point.
//! Both keep the wrapped factory's sub-range capability.

use crate::source::{RecordSource, RecordSourceFactory, SourceInput};
use anyhow::{Result, bail};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Shared counters of an [`InstrumentedFactory`].
#[derive(Debug, Default)]
pub struct OpenStats {
    created: AtomicU64,
    closed: AtomicU64,
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl OpenStats {
    /// Sources created so far.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Sources closed so far.
    #[must_use]
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sources open right now.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most sources ever open at the same time.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn opened(&self) {
        self.created.fetch_add(1, Ordering::SeqCst);
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn released(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts live sources of the wrapped factory, optionally slowing every record down so
/// that sources overlap.
pub struct InstrumentedFactory<F> {
    inner: F,
    stats: Arc<OpenStats>,
    delay: Duration,
}

impl<F> InstrumentedFactory<F> {
    #[must_use]
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            stats: Arc::new(OpenStats::default()),
            delay: Duration::ZERO,
        }
    }

    /// Sleep for `delay` before yielding each record.
    #[must_use]
    pub fn with_record_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn stats(&self) -> Arc<OpenStats> {
        Arc::clone(&self.stats)
    }
}

impl<T, F> RecordSourceFactory<T> for InstrumentedFactory<F>
where
    T: 'static,
    F: RecordSourceFactory<T>,
{
    fn supports_subrange(&self) -> bool {
        self.inner.supports_subrange()
    }

    fn create(&self, path: &str, input: SourceInput) -> Result<Box<dyn RecordSource<T>>> {
        let inner = self.inner.create(path, input)?;
        self.stats.opened();
        Ok(Box::new(InstrumentedSource {
            inner,
            stats: Arc::clone(&self.stats),
            delay: self.delay,
            closed: false,
        }))
    }
}

struct InstrumentedSource<T> {
    inner: Box<dyn RecordSource<T>>,
    stats: Arc<OpenStats>,
    delay: Duration,
    closed: bool,
}

impl<T> RecordSource<T> for InstrumentedSource<T> {
    fn next_record(&mut self) -> Result<Option<T>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.next_record()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.stats.released();
        }
        self.inner.close()
    }
}

impl<T> Drop for InstrumentedSource<T> {
    fn drop(&mut self) {
        // A source dropped without close still counts as released.
        if !self.closed {
            self.closed = true;
            self.stats.released();
        }
    }
}

/// Where a [`FailingFactory`] injects its failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Creating the source fails.
    Open,
    /// The source yields this many records, then fails.
    AfterRecords(u64),
    /// Reading succeeds but closing fails.
    Close,
}

/// Injects a failure into sources of the wrapped factory.
pub struct FailingFactory<F> {
    inner: F,
    point: FailurePoint,
    only_paths_containing: Option<String>,
}

impl<F> FailingFactory<F> {
    #[must_use]
    pub fn new(inner: F, point: FailurePoint) -> Self {
        Self {
            inner,
            point,
            only_paths_containing: None,
        }
    }

    /// Fail only for paths containing `needle`; other files read normally.
    #[must_use]
    pub fn only_for(mut self, needle: impl Into<String>) -> Self {
        self.only_paths_containing = Some(needle.into());
        self
    }

    fn applies_to(&self, path: &str) -> bool {
        self.only_paths_containing
            .as_deref()
            .is_none_or(|needle| path.contains(needle))
    }
}

impl<T, F> RecordSourceFactory<T> for FailingFactory<F>
where
    T: 'static,
    F: RecordSourceFactory<T>,
{
    fn supports_subrange(&self) -> bool {
        self.inner.supports_subrange()
    }

    fn create(&self, path: &str, input: SourceInput) -> Result<Box<dyn RecordSource<T>>> {
        if !self.applies_to(path) {
            return self.inner.create(path, input);
        }
        if self.point == FailurePoint::Open {
            bail!("injected open failure for {path}");
        }
        Ok(Box::new(FailingSource {
            inner: self.inner.create(path, input)?,
            path: path.to_string(),
            point: self.point,
            yielded: 0,
        }))
    }
}

struct FailingSource<T> {
    inner: Box<dyn RecordSource<T>>,
    path: String,
    point: FailurePoint,
    yielded: u64,
}

impl<T> RecordSource<T> for FailingSource<T> {
    fn next_record(&mut self) -> Result<Option<T>> {
        if let FailurePoint::AfterRecords(limit) = self.point {
            if self.yielded >= limit {
                bail!("injected read failure in {} after {limit} records", self.path);
            }
        }
        let record = self.inner.next_record()?;
        if record.is_some() {
            self.yielded += 1;
        }
        Ok(record)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        if self.point == FailurePoint::Close {
            bail!("injected close failure for {}", self.path);
        }
        Ok(())
    }
}
