//! Transparent decompression keyed by a file's [`CompressionKind`].
//!
//! Every [`FileHandle`](crate::FileHandle) carries the compression it was resolved with.
//! The range reader uses [`CompressionKind::wrap_reader`] to decorate the raw file bytes
//! before handing them to a record source, so sources only ever see plain bytes.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` crate (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` crate (feature: `compression-xz`)
//!
//! ## Resolution
//!
//! [`CompressionKind::from_path`] checks the file extension first. Listers that want to be
//! robust against misnamed files can fall back to [`CompressionKind::sniff`], which peeks at
//! the magic bytes of a buffered reader without consuming them.
//!
//! ```no_run
//! use readall::io::compression::CompressionKind;
//! use std::fs::File;
//! # fn main() -> anyhow::Result<()> {
//! let kind = CompressionKind::from_path("events.jsonl.gz");
//! let raw = File::open("events.jsonl.gz")?;
//! let plain = kind.wrap_reader(Box::new(raw))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Seeking
//!
//! Compressed streams don't support random access. Files with any compression other than
//! [`CompressionKind::None`] are therefore never split into sub-ranges.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// Compression applied to a file's bytes at rest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// Plain bytes.
    #[default]
    None,
    Gzip,
    Bzip2,
    Zstd,
    Xz,
}

impl CompressionKind {
    /// Every compressed kind, in detection order.
    pub const COMPRESSED: [Self; 4] = [Self::Gzip, Self::Zstd, Self::Bzip2, Self::Xz];

    /// Human-readable codec name (e.g., "gzip", "zstd").
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Zstd => "zstd",
            Self::Xz => "xz",
        }
    }

    /// File extensions associated with this codec, lowercase with the leading dot.
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::Gzip => &[".gz", ".gzip"],
            Self::Bzip2 => &[".bz2", ".bzip2"],
            Self::Zstd => &[".zst", ".zstd"],
            Self::Xz => &[".xz"],
        }
    }

    /// Magic byte signature at the start of a stream, if the format has one.
    #[must_use]
    pub const fn magic_bytes(self) -> Option<&'static [u8]> {
        match self {
            Self::None => None,
            Self::Gzip => Some(&[0x1f, 0x8b]),
            Self::Bzip2 => Some(b"BZh"),
            Self::Zstd => Some(&[0x28, 0xb5, 0x2f, 0xfd]),
            Self::Xz => Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
        }
    }

    #[must_use]
    pub const fn is_compressed(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the codec for this kind was compiled in.
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::None => true,
            Self::Gzip => cfg!(feature = "compression-gzip"),
            Self::Bzip2 => cfg!(feature = "compression-bzip2"),
            Self::Zstd => cfg!(feature = "compression-zstd"),
            Self::Xz => cfg!(feature = "compression-xz"),
        }
    }

    /// Resolve the kind from a path's extension. Matching is case-insensitive and only
    /// looks at the final extension, so `data.tar.gz` resolves to gzip.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let lower = path.as_ref().to_string_lossy().to_lowercase();
        Self::COMPRESSED
            .into_iter()
            .find(|kind| kind.extensions().iter().any(|ext| lower.ends_with(ext)))
            .unwrap_or(Self::None)
    }

    /// Resolve the kind from the leading bytes of a stream.
    #[must_use]
    pub fn from_magic(header: &[u8]) -> Self {
        Self::COMPRESSED
            .into_iter()
            .find(|kind| kind.magic_bytes().is_some_and(|magic| header.starts_with(magic)))
            .unwrap_or(Self::None)
    }

    /// Peek at a buffered reader and resolve the kind from its magic bytes.
    /// The reader is not advanced.
    pub fn sniff<R: BufRead>(reader: &mut R) -> Self {
        match reader.fill_buf() {
            Ok(buf) if !buf.is_empty() => Self::from_magic(buf),
            _ => Self::None,
        }
    }

    /// Wrap a reader with decompression for this kind. [`CompressionKind::None`] returns
    /// the reader unchanged.
    ///
    /// # Errors
    /// Returns an error if the codec was not compiled in or fails to initialise.
    pub fn wrap_reader(self, reader: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        match self {
            Self::None => Ok(reader),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(reader))),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader))),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => {
                let decoder = zstd::stream::read::Decoder::new(reader)
                    .context("initialise zstd decoder")?;
                Ok(Box::new(decoder))
            }
            #[cfg(feature = "compression-xz")]
            Self::Xz => Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader))),
            #[allow(unreachable_patterns)]
            other => bail!("{} support is not compiled in", other.name()),
        }
    }

    /// Wrap a writer with compression for this kind. Encoders finish their stream when
    /// dropped.
    ///
    /// # Errors
    /// Returns an error if the codec was not compiled in or fails to initialise.
    pub fn wrap_writer(self, writer: Box<dyn Write>) -> Result<Box<dyn Write>> {
        match self {
            Self::None => Ok(writer),
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => Ok(Box::new(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            ))),
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => Ok(Box::new(bzip2::write::BzEncoder::new(
                writer,
                bzip2::Compression::default(),
            ))),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => {
                let encoder = zstd::stream::write::Encoder::new(writer, 3)
                    .context("initialise zstd encoder")?;
                Ok(Box::new(encoder.auto_finish()))
            }
            #[cfg(feature = "compression-xz")]
            Self::Xz => Ok(Box::new(xz2::write::XzEncoder::new(writer, 6))),
            #[allow(unreachable_patterns)]
            other => bail!("{} support is not compiled in", other.name()),
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
