//! Range splitting and work-item planning.
//!
//! A seekable, uncompressed file is carved into contiguous byte ranges of at most
//! `desired_bundle_size_bytes` each so several workers can read it at once. Files that
//! cannot seek cheaply are never split: every range after the first would have to re-read
//! the file from the start to find its offset.
//!
//! A zero-byte file yields exactly one empty work item `[0, 0)`, whether it is seekable or
//! not. The item still goes through the reader, so an unreadable empty file surfaces its
//! open failure like any other file, and it contributes zero records.

use crate::error::{IngestError, IngestResult};
use crate::file::{ByteRange, FileHandle, WorkItem};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Ranges partitioning `[0, size)` into pieces of at most `bundle` bytes.
///
/// `bundle` must be non-zero.
pub fn partition(size: u64, bundle: u64) -> impl Iterator<Item = ByteRange> {
    debug_assert!(bundle > 0);
    let count = if size == 0 { 1 } else { size.div_ceil(bundle) };
    (0..count).map(move |i| {
        let start = i * bundle;
        ByteRange::new(start, start.saturating_add(bundle).min(size))
    })
}

/// Split one file into work items.
///
/// # Errors
/// Returns [`IngestError::InvalidConfig`] if `desired_bundle_size_bytes` is zero.
pub fn split_into_ranges(
    file: &FileHandle,
    desired_bundle_size_bytes: u64,
) -> IngestResult<Vec<WorkItem>> {
    if desired_bundle_size_bytes == 0 {
        return Err(IngestError::InvalidConfig(
            "desired_bundle_size_bytes must be > 0".into(),
        ));
    }
    if !file.supports_efficient_seek() {
        trace!(path = file.path(), "not seekable, single range");
        return Ok(vec![WorkItem::whole_file(file.clone())]);
    }
    Ok(partition(file.size_bytes(), desired_bundle_size_bytes)
        .map(|range| WorkItem::new(file.clone(), range))
        .collect())
}

/// Split every file from a lister into work items.
///
/// When `subrange_capable` is false the record source can only read whole files, so each
/// file collapses to a single whole-file item instead of several ranges that would each
/// re-read it.
///
/// # Errors
/// Propagates the first metadata failure from `files` unchanged, or
/// [`IngestError::InvalidConfig`] for a zero bundle size.
pub fn plan_work_items<I>(
    files: I,
    desired_bundle_size_bytes: u64,
    subrange_capable: bool,
) -> IngestResult<Vec<WorkItem>>
where
    I: IntoIterator<Item = IngestResult<FileHandle>>,
{
    let mut items = Vec::new();
    let mut file_count = 0usize;
    for file in files {
        let file = file?;
        file_count += 1;
        if subrange_capable {
            items.extend(split_into_ranges(&file, desired_bundle_size_bytes)?);
        } else {
            items.push(WorkItem::whole_file(file));
        }
    }
    debug!(
        files = file_count,
        items = items.len(),
        subrange_capable,
        "planned work items"
    );
    Ok(items)
}

/// Shuffle work items in place with a seeded Fisher-Yates pass.
///
/// Only the order changes; the multiset of items is preserved. The same seed always yields
/// the same order for the same input.
pub fn redistribute(items: &mut [WorkItem], seed: u64) {
    let mut rng = SplitMix64::new(seed);
    for i in (1..items.len()).rev() {
        let j = rng.below(i as u64 + 1) as usize;
        items.swap(i, j);
    }
}

/// A seed that differs between runs.
#[must_use]
pub fn clock_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);
    SplitMix64::new(nanos ^ u64::from(std::process::id())).next_u64()
}

#[derive(Clone, Copy, Debug)]
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    #[inline]
    const fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform-enough value in `[0, n)` for shuffling; `n` must be non-zero.
    #[inline]
    fn below(&mut self, n: u64) -> u64 {
        ((u128::from(self.next_u64()) * u128::from(n)) >> 64) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_stays_in_bounds() {
        let mut rng = SplitMix64::new(7);
        for n in 1..200 {
            assert!(rng.below(n) < n);
        }
    }

    #[test]
    fn partition_of_exact_multiple_has_no_short_tail() {
        let ranges: Vec<_> = partition(300, 100).collect();
        assert_eq!(
            ranges,
            vec![
                ByteRange::new(0, 100),
                ByteRange::new(100, 200),
                ByteRange::new(200, 300)
            ]
        );
    }

    #[test]
    fn partition_of_empty_file_is_single_empty_range() {
        let ranges: Vec<_> = partition(0, 1024).collect();
        assert_eq!(ranges, vec![ByteRange::new(0, 0)]);
    }
}
