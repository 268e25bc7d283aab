//! Generated datasets for reader tests.

use serde::{Deserialize, Serialize};

/// A small structured record for JSON Lines and CSV tests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleEvent {
    pub id: u64,
    pub kind: String,
    pub bytes: u64,
}

/// `count` deterministic events with ids `0..count`.
///
/// # Example
///
/// ```
/// use readall::testing::sample_events;
///
/// let events = sample_events(4);
/// assert_eq!(events[3].id, 3);
/// ```
#[must_use]
pub fn sample_events(count: u64) -> Vec<SampleEvent> {
    const KINDS: [&str; 4] = ["open", "read", "close", "error"];
    (0..count)
        .map(|id| SampleEvent {
            id,
            kind: KINDS[(id % 4) as usize].to_string(),
            bytes: (id * 37) % 1_000,
        })
        .collect()
}

/// `count` distinct lines of uneven length: `line-0-`, `line-1-x`, `line-2-xx`, ...
///
/// Lengths cycle so that range boundaries fall at many different positions within lines.
#[must_use]
pub fn numbered_lines(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("line-{i}-{}", "x".repeat(i % 13)))
        .collect()
}

/// Same as [`numbered_lines`], prefixed so lines from different files stay distinct.
#[must_use]
pub fn tagged_lines(tag: &str, count: usize) -> Vec<String> {
    numbered_lines(count)
        .into_iter()
        .map(|line| format!("{tag}:{line}"))
        .collect()
}
