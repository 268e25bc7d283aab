//! Testing utilities for code built on readall.
//!
//! - **Fixtures**: small record types and generated datasets
//! - **Mock I/O**: temporary directories with plain or compressed input files
//! - **Sources**: record-source factories that count open sources or fail on demand
//!
//! # Quick Start
//!
//! ```no_run
//! use readall::io::glob::match_files;
//! use readall::io::lines::TextLinesFactory;
//! use readall::testing::*;
//! use readall::{CompressionKind, ConcurrencyLimiter, ReadAll, ReadAllConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = TempDirPath::new()?;
//! dir.write_lines("a.log", &numbered_lines(100), CompressionKind::None)?;
//! dir.write_lines("b.log.gz", &numbered_lines(50), CompressionKind::Gzip)?;
//!
//! let factory = InstrumentedFactory::new(TextLinesFactory);
//! let stats = factory.stats();
//! let read = ReadAll::<String>::new(factory, ReadAllConfig::default())?
//!     .with_limiter(ConcurrencyLimiter::new(2));
//!
//! let lines = read.collect(match_files(&dir.glob("*.log*"))?)?;
//! assert_eq!(lines.len(), 150);
//! assert!(stats.peak() <= 2);
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod mock_io;
pub mod sources;

pub use fixtures::*;
pub use mock_io::*;
pub use sources::*;

use std::fmt::Debug;

/// Assert that two record sets are equal as multisets.
///
/// Records from different work items arrive in no particular order, so both sides are
/// sorted before comparing.
///
/// # Panics
///
/// Panics if the collections differ in length or content.
///
/// # Example
///
/// ```
/// use readall::testing::assert_same_records;
///
/// assert_same_records(vec![3, 1, 2, 2], vec![2, 1, 2, 3]);
/// ```
pub fn assert_same_records<T: Ord + Debug>(mut actual: Vec<T>, mut expected: Vec<T>) {
    actual.sort();
    expected.sort();
    assert_eq!(
        actual.len(),
        expected.len(),
        "record count mismatch:\n  expected: {expected:?}\n  actual: {actual:?}"
    );
    assert_eq!(actual, expected, "records differ (both sides sorted)");
}
