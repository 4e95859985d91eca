//! Directory archive codec
//!
//! Streams a directory tree to a tar (optionally gzip compressed) stream and
//! back. Extraction refuses any entry that would land outside the
//! destination directory.

mod compress;
mod extract;

pub use compress::compress;
pub use extract::extract;

use std::fmt;
use std::str::FromStr;

use crate::error::ArchiveError;

/// Supported archive representations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Plain tar stream
    Tar,
    /// Tar stream wrapped in gzip
    TarGz,
}

impl ArchiveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    fn is_gzipped(&self) -> bool {
        matches!(self, ArchiveFormat::TarGz)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveFormat {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tar" => Ok(ArchiveFormat::Tar),
            "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            other => Err(ArchiveError::UnknownFormat(other.to_string())),
        }
    }
}

/// Options applied while compressing a directory
///
/// `prefix_components` are path segments placed ahead of every archived
/// entry. They are never created on disk; whoever extracts the archive has
/// to strip the same number of segments to get the original layout back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressOptions {
    prefix_components: Vec<String>,
}

impl CompressOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive every entry below the given directory segments
    pub fn prefix_components<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_components = dirs
            .into_iter()
            .map(Into::into)
            .map(|dir| dir.trim_matches('/').to_string())
            .filter(|dir| !dir.is_empty())
            .collect();
        self
    }

    /// The prefix joined with `/`, empty when no prefix was requested
    pub(crate) fn prefix(&self) -> String {
        self.prefix_components.join("/")
    }
}

/// Options applied while extracting an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    strip_components: usize,
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the first `n` slash-delimited segments of every entry name.
    /// Negative values are treated as 0.
    pub fn strip_components(mut self, n: i64) -> Self {
        self.strip_components = usize::try_from(n.max(0)).unwrap_or(usize::MAX);
        self
    }

    pub(crate) fn stripped(&self) -> usize {
        self.strip_components
    }
}
