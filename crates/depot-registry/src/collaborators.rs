//! Contracts the publishing pipeline calls out to, and the registry that
//! resolves them by kind tag

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::entities::{Artifact, PackageFormat, StorageKind, VcsKind};
use crate::error::{BoxError, RegistryError, Result};

/// Where in a repository to fetch from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsOptions {
    /// Commit, branch or tag
    pub reference: String,
    /// Only archive this directory of the repository
    pub subdir: Option<String>,
}

/// What to package and how to label it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOptions {
    /// Directory holding the extracted sources
    pub dir: PathBuf,
    pub package: String,
    pub version: String,
}

/// Streams a gzip-compressed tar of a repository
///
/// Archives are expected to wrap their content in one top-level directory,
/// which the pipeline strips on extraction.
#[async_trait]
pub trait VcsFetcher: Send + Sync {
    fn kind(&self) -> VcsKind;

    async fn fetch_archive(
        &self,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
        repository: &str,
        options: &VcsOptions,
    ) -> std::result::Result<(), BoxError>;
}

/// Builds a distributable archive from a source directory
#[async_trait]
pub trait Packager: Send + Sync {
    fn format(&self) -> PackageFormat;

    async fn package(
        &self,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
        options: &PackageOptions,
    ) -> std::result::Result<(), BoxError>;
}

/// Writes content to a backing store
#[async_trait]
pub trait Uploader: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Store `src` at the logical `path` and return the URI actually used
    async fn write(
        &self,
        src: &mut (dyn AsyncRead + Unpin + Send),
        path: &str,
    ) -> std::result::Result<String, BoxError>;
}

/// Records artifacts durably
#[async_trait]
pub trait Persister: Send + Sync {
    /// Create the artifact and all its pending versions as one atomic write,
    /// returning them with generated ids attached
    async fn create_artifact(&self, artifact: Artifact) -> Result<Artifact>;

    /// Whether `version` of the artifact called `name` is already recorded
    async fn version_exists(&self, name: &str, version: &str) -> Result<bool>;
}

/// Fetchers, packagers and uploaders available to a publisher
///
/// Built once at startup and handed to [`crate::Publisher::new`]. Lookups
/// scan linearly; when two implementations share a tag the first one added
/// wins.
#[derive(Clone, Default)]
pub struct Collaborators {
    packagers: Vec<Arc<dyn Packager>>,
    fetchers: Vec<Arc<dyn VcsFetcher>>,
    uploaders: Vec<Arc<dyn Uploader>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packager(mut self, packager: impl Packager + 'static) -> Self {
        self.packagers.push(Arc::new(packager));
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl VcsFetcher + 'static) -> Self {
        self.fetchers.push(Arc::new(fetcher));
        self
    }

    pub fn with_uploader(mut self, uploader: impl Uploader + 'static) -> Self {
        self.uploaders.push(Arc::new(uploader));
        self
    }

    pub fn packager(&self, format: PackageFormat) -> Result<&dyn Packager> {
        self.packagers
            .iter()
            .find(|p| p.format() == format)
            .map(|p| p.as_ref())
            .ok_or_else(|| RegistryError::UnknownPackager(format.to_string()))
    }

    pub fn fetcher(&self, kind: VcsKind) -> Result<&dyn VcsFetcher> {
        self.fetchers
            .iter()
            .find(|f| f.kind() == kind)
            .map(|f| f.as_ref())
            .ok_or_else(|| RegistryError::UnknownFetcher(kind.to_string()))
    }

    pub fn uploader(&self, kind: StorageKind) -> Result<&dyn Uploader> {
        self.uploaders
            .iter()
            .find(|u| u.kind() == kind)
            .map(|u| u.as_ref())
            .ok_or_else(|| RegistryError::UnknownUploader(kind.to_string()))
    }

    /// Tags of everything registered, for diagnostics
    pub fn describe(&self) -> (Vec<PackageFormat>, Vec<VcsKind>, Vec<StorageKind>) {
        (
            self.packagers.iter().map(|p| p.format()).collect(),
            self.fetchers.iter().map(|f| f.kind()).collect(),
            self.uploaders.iter().map(|u| u.kind()).collect(),
        )
    }
}
