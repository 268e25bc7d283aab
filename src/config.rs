//! Recognised options for [`ReadAll`](crate::ReadAll).
//!
//! ```
//! use readall::ReadAllConfig;
//!
//! let cfg = ReadAllConfig::default()
//!     .with_desired_bundle_size_bytes(8 * 1024 * 1024)
//!     .with_concurrency_limit(4);
//! assert!(cfg.validate().is_ok());
//!
//! // Missing fields fall back to their defaults.
//! let cfg = ReadAllConfig::from_json_str(r#"{ "uses_redistribution": false }"#).unwrap();
//! assert_eq!(cfg.concurrency_limit, 10);
//! ```
//!
//! The exception policy is not part of the serialisable config; it is injected on the
//! transform itself with [`ReadAll::with_exception_policy`](crate::ReadAll::with_exception_policy).

use crate::error::{IngestError, IngestResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default split granularity: 64 MiB.
pub const DEFAULT_BUNDLE_SIZE_BYTES: u64 = 64 * 1024 * 1024;
/// Default number of files that may be open at once in a process.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;
/// Default whether split work items are shuffled before reading.
pub const DEFAULT_USES_REDISTRIBUTION: bool = true;
/// Default capacity of the record channel used by [`ReadAll::stream`](crate::ReadAll::stream).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadAllConfig {
    /// Upper bound on the byte length of each work item for seekable files.
    pub desired_bundle_size_bytes: u64,
    /// Shuffle work items before reading to spread large files across workers.
    pub uses_redistribution: bool,
    /// Fix the shuffle order; `None` seeds from the clock.
    pub redistribution_seed: Option<u64>,
    /// Most files open at once. Transforms with the same limit share one process-wide
    /// pool. Ignored when a limiter is injected.
    pub concurrency_limit: usize,
    /// Worker threads; `None` uses one per CPU.
    pub parallelism: Option<usize>,
    pub channel_capacity: usize,
}

impl Default for ReadAllConfig {
    fn default() -> Self {
        Self {
            desired_bundle_size_bytes: DEFAULT_BUNDLE_SIZE_BYTES,
            uses_redistribution: DEFAULT_USES_REDISTRIBUTION,
            redistribution_seed: None,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            parallelism: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ReadAllConfig {
    /// Parse a JSON document. Absent fields keep their defaults.
    ///
    /// # Errors
    /// Returns [`IngestError::InvalidConfig`] if the document does not parse or fails
    /// [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> IngestResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| IngestError::InvalidConfig(format!("parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// Returns [`IngestError::InvalidConfig`] if the file cannot be read, does not parse,
    /// or fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> IngestResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))
            .map_err(|e| IngestError::InvalidConfig(format!("{e:#}")))?;
        Self::from_json_str(&text)
    }

    /// # Errors
    /// Returns [`IngestError::InvalidConfig`] naming the first offending option.
    pub fn validate(&self) -> IngestResult<()> {
        if self.desired_bundle_size_bytes == 0 {
            return Err(IngestError::InvalidConfig(
                "desired_bundle_size_bytes must be > 0".into(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(IngestError::InvalidConfig(
                "concurrency_limit must be > 0".into(),
            ));
        }
        if self.parallelism == Some(0) {
            return Err(IngestError::InvalidConfig(
                "parallelism must be > 0 when set".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(IngestError::InvalidConfig(
                "channel_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Worker thread count after applying the CPU default.
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.unwrap_or_else(|| num_cpus::get().max(2))
    }

    #[must_use]
    pub const fn with_desired_bundle_size_bytes(mut self, bytes: u64) -> Self {
        self.desired_bundle_size_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_redistribution(mut self, enabled: bool) -> Self {
        self.uses_redistribution = enabled;
        self
    }

    #[must_use]
    pub const fn with_redistribution_seed(mut self, seed: u64) -> Self {
        self.redistribution_seed = Some(seed);
        self
    }

    #[must_use]
    pub const fn with_concurrency_limit(mut self, permits: usize) -> Self {
        self.concurrency_limit = permits;
        self
    }

    #[must_use]
    pub const fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }

    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}
