//! Temporary input files for tests.
//!
//! Files are written through [`CompressionKind::wrap_writer`], so a test can lay out a
//! directory mixing plain and compressed inputs and list it with a glob.

use crate::io::compression::CompressionKind;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory that is automatically deleted when dropped.
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// Create a new temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a file path within this directory.
    #[must_use]
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }

    /// A glob pattern rooted at this directory, e.g. `dir.glob("*.jsonl")`.
    #[must_use]
    pub fn glob(&self, pattern: &str) -> String {
        self.path.join(pattern).to_string_lossy().into_owned()
    }

    /// Write raw bytes, uncompressed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_bytes(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.file_path(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Write one line per element, each terminated by `\n`, compressed with `compression`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the codec is not compiled in.
    pub fn write_lines<S: AsRef<str>>(
        &self,
        filename: &str,
        lines: &[S],
        compression: CompressionKind,
    ) -> Result<PathBuf> {
        self.write_with(filename, compression, |w| {
            for line in lines {
                w.write_all(line.as_ref().as_bytes())?;
                w.write_all(b"\n")?;
            }
            Ok(())
        })
    }

    /// Write one compact JSON value per line, compressed with `compression`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_jsonl<T: Serialize>(
        &self,
        filename: &str,
        records: &[T],
        compression: CompressionKind,
    ) -> Result<PathBuf> {
        self.write_with(filename, compression, |w| {
            for record in records {
                serde_json::to_writer(&mut *w, record)?;
                w.write_all(b"\n")?;
            }
            Ok(())
        })
    }

    fn write_with(
        &self,
        filename: &str,
        compression: CompressionKind,
        body: impl FnOnce(&mut dyn Write) -> Result<()>,
    ) -> Result<PathBuf> {
        let path = self.file_path(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut writer = compression.wrap_writer(Box::new(BufWriter::new(file)))?;
        body(&mut *writer).with_context(|| format!("write {}", path.display()))?;
        writer.flush()?;
        // Dropping the encoder writes the codec trailer.
        drop(writer);
        Ok(path)
    }
}

impl Default for TempDirPath {
    fn default() -> Self {
        Self::new().expect("Failed to create temporary directory")
    }
}
