//! Decide whether a read failure fails the job or is swallowed.
//!
//! An [`ExceptionPolicy`] is consulted once per failing work item with the file, the range
//! being read, and the failure. Returning `true` rethrows: the work item fails and the
//! surrounding run stops. Returning `false` ends the work item early; records it already
//! produced are kept.
//!
//! Any `Fn(&FileHandle, &ByteRange, &anyhow::Error) -> bool` closure is a policy:
//!
//! ```
//! use readall::{ByteRange, ExceptionPolicy, FileHandle};
//!
//! // Tolerate corrupt archives, fail on everything else.
//! let policy = |file: &FileHandle, _range: &ByteRange, _err: &anyhow::Error| {
//!     !file.path().ends_with(".gz")
//! };
//! let err = anyhow::anyhow!("invalid gzip header");
//! assert!(!policy.should_rethrow(&FileHandle::new("a.gz", 10), &ByteRange::new(0, 10), &err));
//! ```

use crate::file::{ByteRange, FileHandle};

/// Strategy for read failures. Implementations must be side-effect free apart from
/// logging; they may be called concurrently from many workers.
pub trait ExceptionPolicy: Send + Sync {
    /// Return `true` to fail the work item, `false` to skip the rest of it.
    fn should_rethrow(&self, file: &FileHandle, range: &ByteRange, error: &anyhow::Error) -> bool;
}

impl<F> ExceptionPolicy for F
where
    F: Fn(&FileHandle, &ByteRange, &anyhow::Error) -> bool + Send + Sync,
{
    fn should_rethrow(&self, file: &FileHandle, range: &ByteRange, error: &anyhow::Error) -> bool {
        self(file, range, error)
    }
}

/// Default: every failure fails the job.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRethrow;

impl ExceptionPolicy for AlwaysRethrow {
    fn should_rethrow(&self, _: &FileHandle, _: &ByteRange, _: &anyhow::Error) -> bool {
        true
    }
}

/// Swallow every failure and move on to the next work item.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipFailures;

impl ExceptionPolicy for SkipFailures {
    fn should_rethrow(&self, _: &FileHandle, _: &ByteRange, _: &anyhow::Error) -> bool {
        false
    }
}
