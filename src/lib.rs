//! # readall
//!
//! Read every record of a large, mixed set of files as one stream.
//!
//! A file listing goes through three steps:
//!
//! 1. **Split** - seekable, uncompressed files are carved into byte ranges of at most
//!    `desired_bundle_size_bytes`; everything else becomes one whole-file work item.
//! 2. **Redistribute** - work items are shuffled so several large files do not all land on
//!    the same worker.
//! 3. **Read** - each work item is opened through a pluggable [`RecordSourceFactory`]
//!    while holding a permit from a fair [`ConcurrencyLimiter`], so no more than
//!    `concurrency_limit` files are ever open at once, however many threads are reading.
//!
//! Failures opening or reading a work item go to an [`ExceptionPolicy`] that decides
//! whether to fail the run or to log the failure and keep the records already produced.
//!
//! ## Quick Start
//!
//! ```no_run
//! use readall::io::glob::match_files;
//! use readall::io::lines::TextLinesFactory;
//! use readall::{ReadAll, ReadAllConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ReadAllConfig::default()
//!     .with_desired_bundle_size_bytes(16 * 1024 * 1024)
//!     .with_concurrency_limit(8);
//! let read = ReadAll::new(TextLinesFactory, config)?;
//!
//! let lines = read.collect(match_files("data/*.log*")?)?;
//! println!("{} lines", lines.len());
//! read.metrics().log_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Work items
//!
//! A [`WorkItem`] is a [`FileHandle`] plus a [`ByteRange`]. Ranges of one file partition
//! `[0, size)` exactly. A zero-byte file produces a single empty range `[0, 0)`.
//!
//! ### Record sources
//!
//! A [`RecordSourceFactory`] turns an open byte stream into typed records. Sources that
//! can start mid-file (lines, JSON Lines) advertise it with
//! [`supports_subrange`](RecordSourceFactory::supports_subrange); others (CSV) always read
//! whole files and their files are never split.
//!
//! ### Limiter
//!
//! Transforms configured with the same `concurrency_limit` share one process-wide pool
//! ([`ConcurrencyLimiter::shared`]); a transform can also be given its own. Waiters are
//! served in arrival order.
//!
//! ## Feature Flags
//!
//! - `io-jsonl` - JSON Lines record source
//! - `io-csv` - CSV record source
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz` -
//!   transparent decompression of whole-file reads
//!
//! All are enabled by default.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and installs no subscriber. Opening and closing
//! sources logs at `debug`, permit hand-off at `trace`, failures swallowed by the policy
//! at `warn`, and run summaries at `info`.

pub mod cancel;
pub mod config;
pub mod error;
pub mod file;
pub mod io;
pub mod limiter;
pub mod metrics;
pub mod policy;
pub mod reader;
pub mod source;
pub mod split;
pub mod testing;
pub mod transform;

// General re-exports
pub use cancel::CancelToken;
pub use config::ReadAllConfig;
pub use error::{IngestError, IngestResult};
pub use file::{ByteRange, FileHandle, FileMetadata, WorkItem};
pub use io::compression::CompressionKind;
pub use limiter::{ConcurrencyLimiter, Permit};
pub use metrics::{ReadMetrics, ReadMetricsSnapshot};
pub use policy::{AlwaysRethrow, ExceptionPolicy, SkipFailures};
pub use reader::{RangeReader, RangeRecords, ReadOutcome, ReadStatus};
pub use source::{RecordSource, RecordSourceFactory, SourceInput};
pub use split::{partition, plan_work_items, redistribute, split_into_ranges};
pub use transform::{ReadAll, RecordStream, RunSummary};

// Gated re-exports
#[cfg(feature = "io-jsonl")]
pub use io::jsonl::JsonlFactory;

#[cfg(feature = "io-csv")]
pub use io::csv::CsvFactory;
