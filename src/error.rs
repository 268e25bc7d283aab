use crate::file::ByteRange;
use thiserror::Error;

/// Convenience result type for the reading core.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors surfaced by splitting, throttling and reading.
///
/// Collaborator failures (listers, record sources, codecs) travel as [`anyhow::Error`]
/// causes so their context chains survive. `Open` and `Read` only reach the caller when
/// the exception policy asked for the failure to be rethrown; swallowed failures never
/// become errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The size or seekability of a file could not be determined.
    #[error("read metadata for {path}: {cause:#}")]
    Metadata { path: String, cause: anyhow::Error },

    /// The file pattern was invalid or could not be expanded.
    #[error("expand file pattern '{pattern}': {cause:#}")]
    Pattern { pattern: String, cause: anyhow::Error },

    /// A record source could not be created or opened.
    #[error("open {path}{range}: {cause:#}")]
    Open {
        path: String,
        range: ByteRange,
        cause: anyhow::Error,
    },

    /// A record source failed while producing or closing records.
    #[error("read {path}{range}: {cause:#}")]
    Read {
        path: String,
        range: ByteRange,
        cause: anyhow::Error,
    },

    /// The work item was cancelled before it finished.
    #[error("reading {path} was cancelled")]
    Cancelled { path: String },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread pool or channel could not be set up.
    #[error("execution: {0:#}")]
    Execution(anyhow::Error),
}

impl IngestError {
    /// The underlying collaborator failure, if there is one.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Metadata { cause, .. }
            | Self::Pattern { cause, .. }
            | Self::Open { cause, .. }
            | Self::Read { cause, .. } => Some(cause),
            Self::Execution(cause) => Some(cause),
            Self::Cancelled { .. } | Self::InvalidConfig(_) => None,
        }
    }

    /// True for failures that came out of a record source (open or read).
    #[must_use]
    pub const fn is_source_failure(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Read { .. })
    }
}
