//! Byte access to files by path.
//!
//! The reader opens every file through a [`FileSystem`] so that tests and alternative
//! storage backends can supply bytes without touching the local disk.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::sync::{Arc, RwLock};

/// A seekable byte stream that can move between threads.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

pub trait FileSystem: Send + Sync {
    /// Open `path` for reading from offset 0.
    ///
    /// # Errors
    /// Returns an error if the file does not exist or cannot be opened.
    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>>;
}

/// The local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>> {
        let f = File::open(path).with_context(|| format!("open {path}"))?;
        Ok(Box::new(f))
    }
}

/// Files held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Arc<RwLock<HashMap<String, Arc<[u8]>>>>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file. Returns its size in bytes.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> u64 {
        let bytes: Arc<[u8]> = bytes.into().into();
        let size = bytes.len() as u64;
        self.files
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(path.into(), bytes);
        size
    }

    #[must_use]
    pub fn size_of(&self, path: &str) -> Option<u64> {
        self.files
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .map(|b| b.len() as u64)
    }
}

/// Cheap shared view over an in-memory file.
struct SharedBytes(Arc<[u8]>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>> {
        let bytes = self
            .files
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(path)
            .cloned()
            .with_context(|| format!("open {path}: no such file"))?;
        Ok(Box::new(Cursor::new(SharedBytes(bytes))))
    }
}
