//! Error types for the depot registry

use crate::storage::StorageError;
use thiserror::Error;

/// Boxed error returned by injected collaborators (fetchers, packagers, uploaders)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Registry-specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown packager: {0}")]
    UnknownPackager(String),

    #[error("unknown fetcher: {0}")]
    UnknownFetcher(String),

    #[error("unknown uploader: {0}")]
    UnknownUploader(String),

    #[error("no storage found for path: {0}")]
    NoStorageForPath(String),

    #[error("object already exists: {0}")]
    ObjectExists(String),

    #[error("failed to construct storage for: {root}: {source}")]
    OpenStorage {
        root: String,
        #[source]
        source: StorageError,
    },

    #[error("storage error for {uri}: {source}")]
    Storage {
        uri: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to download archive from VCS: {repo}: {source}")]
    Fetch {
        repo: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to extract archive: {0}")]
    Extract(#[from] depot::ArchiveError),

    #[error("failed creating {format} package: {source}")]
    Package {
        format: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to upload package: {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to persist artifact {name}@{version}: {source}")]
    Persist {
        name: String,
        version: String,
        #[source]
        source: Box<RegistryError>,
    },

    #[error("artifact {name} version {version} is already published")]
    AlreadyPublished { name: String, version: String },

    #[error("artifact {name} is a {existing} artifact, not {requested}")]
    FormatMismatch {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Version {version} not found for artifact {name}")]
    VersionNotFound { name: String, version: String },

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("publish cancelled")]
    Cancelled,

    #[error("{source}: rolling back transaction: {rollback}")]
    Rollback {
        #[source]
        source: Box<RegistryError>,
        rollback: Box<RegistryError>,
    },

    #[cfg(feature = "sqlite")]
    #[error("committing transaction: {0}")]
    Commit(#[source] sqlx::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Scratch resource error: {0}")]
    Scratch(#[from] depot::ScratchError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Time error: {0}")]
    Time(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// True when the artifact version already exists, however deep the
    /// pipeline wrapped the underlying persistence error.
    pub fn is_already_published(&self) -> bool {
        match self {
            RegistryError::AlreadyPublished { .. } => true,
            RegistryError::Persist { source, .. } | RegistryError::Rollback { source, .. } => {
                source.is_already_published()
            }
            _ => false,
        }
    }

    /// True when extraction refused an entry that escaped its destination
    pub fn is_illegal_path(&self) -> bool {
        matches!(self, RegistryError::Extract(e) if e.is_illegal_path())
    }

    /// True for misconfigured requests that were rejected before any I/O
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RegistryError::UnknownPackager(_)
                | RegistryError::UnknownFetcher(_)
                | RegistryError::UnknownUploader(_)
        )
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
