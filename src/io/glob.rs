//! Glob-based file lister.
//!
//! Expands a pattern into a sorted list of regular files and lazily turns each path into
//! a [`FileHandle`] carrying size, compression and seekability. Directories never appear
//! in the output.
//!
//! # Examples
//!
//! ```no_run
//! use readall::io::glob::match_files;
//!
//! // Match all JSONL files in a directory, compressed or not
//! for file in match_files("logs/*.jsonl*")? {
//!     let file = file?;
//!     println!("{} ({} bytes, {})", file.path(), file.size_bytes(), file.compression());
//! }
//! # Ok::<(), readall::IngestError>(())
//! ```
//!
//! # Compression
//!
//! Compression is resolved from the file extension first. Files without a recognised
//! extension have their first bytes sniffed for a codec signature. Compressed files are
//! reported as not seekable.

use crate::error::{IngestError, IngestResult};
use crate::file::{FileHandle, FileMetadata};
use crate::io::compression::CompressionKind;
use anyhow::{Context, anyhow};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand a glob pattern into a sorted vector of matching file paths.
///
/// Supports standard glob patterns:
/// - `*` matches any sequence of characters within a path component
/// - `?` matches any single character
/// - `**` matches zero or more directories
/// - `[abc]` matches any character in the set
///
/// Zero matches is not an error; see [`expand_glob_required`].
///
/// # Errors
///
/// Returns [`IngestError::Pattern`] if the pattern is invalid or a matched entry cannot be
/// read.
pub fn expand_glob(pattern: &str) -> IngestResult<Vec<PathBuf>> {
    let pattern_err = |cause: anyhow::Error| IngestError::Pattern {
        pattern: pattern.to_string(),
        cause,
    };
    let paths = glob::glob(pattern).map_err(|e| pattern_err(e.into()))?;

    let mut result = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| pattern_err(e.into()))?;
        // Only include actual files, not directories
        if path.is_file() {
            result.push(path);
        }
    }

    // Sort for deterministic order
    result.sort();
    Ok(result)
}

/// Like [`expand_glob`], but zero matches is an error.
///
/// # Errors
///
/// As [`expand_glob`], plus [`IngestError::Pattern`] when nothing matches.
pub fn expand_glob_required(pattern: &str) -> IngestResult<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        return Err(IngestError::Pattern {
            pattern: pattern.to_string(),
            cause: anyhow!("no files found"),
        });
    }
    Ok(files)
}

/// Read the metadata of one local file into a [`FileHandle`].
///
/// # Errors
///
/// Returns [`IngestError::Metadata`] if the file cannot be stat'ed, is a directory, or
/// cannot be opened to sniff its compression.
pub fn file_handle(path: impl AsRef<Path>) -> IngestResult<FileHandle> {
    let path = path.as_ref();
    let display = path.to_string_lossy().into_owned();
    let meta_err = |cause: anyhow::Error| IngestError::Metadata {
        path: display.clone(),
        cause,
    };

    let stat = std::fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))
        .map_err(meta_err)?;
    if stat.is_dir() {
        return Err(meta_err(anyhow!("is a directory")));
    }

    let mut compression = CompressionKind::from_path(path);
    if !compression.is_compressed() && stat.len() > 0 {
        let f = File::open(path)
            .with_context(|| format!("open {} to sniff compression", path.display()))
            .map_err(meta_err)?;
        compression = CompressionKind::sniff(&mut BufReader::with_capacity(16, f));
    }

    Ok(FileHandle::from_metadata(FileMetadata {
        path: display.clone(),
        size_bytes: stat.len(),
        supports_efficient_seek: !compression.is_compressed(),
        compression,
    }))
}

/// Lazily list the files matching `pattern`.
///
/// The pattern is expanded eagerly (so pattern errors surface immediately); metadata for
/// each file is read as the iterator is consumed.
///
/// # Errors
///
/// Returns [`IngestError::Pattern`] if the pattern is invalid.
pub fn match_files(
    pattern: &str,
) -> IngestResult<impl Iterator<Item = IngestResult<FileHandle>> + Send + use<>> {
    let paths = expand_glob(pattern)?;
    debug!(pattern, files = paths.len(), "matched files");
    Ok(paths.into_iter().map(file_handle))
}
