//! File handles, byte ranges and work items.
//!
//! These are the immutable values that flow from the file lister through the splitter to
//! the range reader. A [`FileHandle`] is cheap to clone: every [`WorkItem`] produced for a
//! file shares the same underlying metadata.

use crate::io::compression::CompressionKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// Metadata describing one discoverable file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: String,
    pub size_bytes: u64,
    /// Whether random-access reads at an arbitrary offset are cheap.
    pub supports_efficient_seek: bool,
    pub compression: CompressionKind,
}

/// Shared, immutable reference to a file and its metadata.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FileHandle {
    meta: Arc<FileMetadata>,
}

impl FileHandle {
    /// Build a handle for an uncompressed, seekable file.
    pub fn new(path: impl Into<String>, size_bytes: u64) -> Self {
        Self::from_metadata(FileMetadata {
            path: path.into(),
            size_bytes,
            supports_efficient_seek: true,
            compression: CompressionKind::None,
        })
    }

    #[must_use]
    pub fn from_metadata(meta: FileMetadata) -> Self {
        Self { meta: Arc::new(meta) }
    }

    /// Set the compression. Compressed files are never seekable, so this also clears
    /// `supports_efficient_seek` for any kind other than [`CompressionKind::None`].
    #[must_use]
    pub fn with_compression(self, compression: CompressionKind) -> Self {
        let mut meta = (*self.meta).clone();
        meta.compression = compression;
        if compression.is_compressed() {
            meta.supports_efficient_seek = false;
        }
        Self::from_metadata(meta)
    }

    #[must_use]
    pub fn with_efficient_seek(self, seekable: bool) -> Self {
        let mut meta = (*self.meta).clone();
        meta.supports_efficient_seek = seekable;
        Self::from_metadata(meta)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.meta.path
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        Path::new(&self.meta.path)
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.meta.size_bytes
    }

    #[must_use]
    pub fn supports_efficient_seek(&self) -> bool {
        self.meta.supports_efficient_seek
    }

    #[must_use]
    pub fn compression(&self) -> CompressionKind {
        self.meta.compression
    }

    #[must_use]
    pub fn metadata(&self) -> &FileMetadata {
        &self.meta
    }

    /// The range covering the whole file.
    #[must_use]
    pub fn whole_range(&self) -> ByteRange {
        ByteRange::whole(self.meta.size_bytes)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.meta.path)
            .field("size_bytes", &self.meta.size_bytes)
            .field("seekable", &self.meta.supports_efficient_seek)
            .field("compression", &self.meta.compression)
            .finish()
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.meta.path)
    }
}

/// Half-open span `[from, to)` of a file's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    from: u64,
    to: u64,
}

impl ByteRange {
    /// # Panics
    ///
    /// Panics if `from > to`.
    #[must_use]
    pub const fn new(from: u64, to: u64) -> Self {
        assert!(from <= to, "ByteRange requires from <= to");
        Self { from, to }
    }

    /// `[0, size)`.
    #[must_use]
    pub const fn whole(size: u64) -> Self {
        Self { from: 0, to: size }
    }

    /// First byte offset (inclusive).
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.from
    }

    /// End offset (exclusive).
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.to
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.to - self.from
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.from == self.to
    }

    #[must_use]
    pub const fn contains(&self, offset: u64) -> bool {
        self.from <= offset && offset < self.to
    }

    /// True when this range spans an entire file of `size` bytes.
    #[must_use]
    pub const fn is_whole(&self, size: u64) -> bool {
        self.from == 0 && self.to >= size
    }
}

impl From<Range<u64>> for ByteRange {
    fn from(r: Range<u64>) -> Self {
        Self::new(r.start, r.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// One unit of scheduled reading work: a file plus a byte range of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub file: FileHandle,
    pub range: ByteRange,
}

impl WorkItem {
    #[must_use]
    pub fn new(file: FileHandle, range: ByteRange) -> Self {
        Self { file, range }
    }

    /// A work item covering the whole file.
    #[must_use]
    pub fn whole_file(file: FileHandle) -> Self {
        let range = file.whole_range();
        Self { file, range }
    }

    /// True when the range covers the whole file.
    #[must_use]
    pub fn is_whole_file(&self) -> bool {
        self.range.is_whole(self.file.size_bytes())
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file, self.range)
    }
}
