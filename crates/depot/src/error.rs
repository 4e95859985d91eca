//! Error types for the depot archive codec and scratch helpers
//!
//! Every variant carries the path it failed on so callers can report the
//! problem without re-deriving which entry or directory was involved.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while compressing or extracting archives
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Walking or streaming the source directory failed
    #[error("failed to compress dir: {src}: {source}")]
    Compress {
        src: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The gzip stream could not be opened or finalised
    #[error("failed to open gzip stream: {0}")]
    Gzip(#[source] io::Error),

    /// The next tar header could not be read
    #[error("failed to read header: {0}")]
    ReadHeader(#[source] io::Error),

    /// An entry resolved to a location outside the destination directory
    #[error("illegal path: {path}")]
    IllegalPath { path: String },

    #[error("failed to create directory: {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file: {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to close file: {path}: {source}")]
    CloseFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unknown archive format name
    #[error("unknown archive format: {0}")]
    UnknownFormat(String),
}

impl ArchiveError {
    /// True when extraction was refused because an entry escaped the destination
    pub fn is_illegal_path(&self) -> bool {
        matches!(self, ArchiveError::IllegalPath { .. })
    }
}

/// Errors produced by scratch file and directory acquisition
#[derive(Error, Debug)]
pub enum ScratchError {
    #[error("failed to create temp dir: {0}")]
    CreateDir(#[source] io::Error),

    #[error("failed to create file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to seek in scratch file: {0}")]
    Seek(#[source] io::Error),
}

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;
