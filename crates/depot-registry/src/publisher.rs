//! Publishing pipeline
//!
//! Turns a [`PublishRequest`] into a stored archive and a persisted
//! artifact version:
//!
//! 1. resolve the packager, fetcher and uploader for the request's tags
//! 2. fetch the repository archive into a scratch file
//! 3. extract it into a scratch directory, dropping the archive's top-level
//!    directory
//! 4. package the directory into a second scratch file
//! 5. upload the package to `<format>/<package>@<version>.<ext>`
//! 6. persist the artifact and its new version
//!
//! A version that is already recorded is refused before anything is
//! fetched, so a republish never touches the stored archive.
//!
//! Any failure stops the pipeline. Scratch resources are released when the
//! stage that acquired them ends, whichever way it ends.

use std::future::Future;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use depot::{
    ArchiveFormat, ExtractOptions, ScratchDir, extract, rewind, with_scratch_dir, with_scratch_file,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collaborators::{
    Collaborators, PackageOptions, Packager, Persister, Uploader, VcsFetcher, VcsOptions,
};
use crate::entities::{
    Artifact, ArtifactVersion, MAX_NAME_LEN, MAX_VERSION_LEN, PackageFormat, StorageKind, VcsKind,
    check_len,
};
use crate::error::{RegistryError, Result};

/// Everything needed to publish one artifact version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub format: PackageFormat,
    pub storage: StorageKind,
    pub vcs: VcsKind,
    pub repository: String,
    /// Commit, branch or tag to publish from
    pub reference: String,
    #[serde(default)]
    pub subdir: Option<String>,
    pub package: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
}

impl PublishRequest {
    pub fn validate(&self) -> Result<()> {
        check_len("package", &self.package, MAX_NAME_LEN)?;
        check_len("version", &self.version, MAX_VERSION_LEN)?;
        if self.repository.is_empty() {
            return Err(RegistryError::Invalid("repository must not be empty".into()));
        }
        if self.reference.is_empty() {
            return Err(RegistryError::Invalid("reference must not be empty".into()));
        }
        if self.package.contains('/') || self.version.contains('/') {
            return Err(RegistryError::Invalid(
                "package and version must not contain '/'".into(),
            ));
        }
        Ok(())
    }

    /// Logical path the package is uploaded to
    pub fn storage_path(&self) -> String {
        format!(
            "{}/{}@{}.{}",
            self.format,
            self.package,
            self.version,
            self.format.extension()
        )
    }

    pub fn vcs_options(&self) -> VcsOptions {
        VcsOptions {
            reference: self.reference.clone(),
            subdir: self.subdir.clone(),
        }
    }
}

/// Runs publish requests against a fixed set of collaborators
pub struct Publisher {
    collaborators: Collaborators,
    persister: Arc<dyn Persister>,
}

impl Publisher {
    pub fn new(collaborators: Collaborators, persister: Arc<dyn Persister>) -> Self {
        Self {
            collaborators,
            persister,
        }
    }

    /// Publish one artifact version and return the persisted artifact
    ///
    /// Unknown tags are reported before anything is fetched, checked in the
    /// order packager, fetcher, uploader. A version that is already
    /// published fails with [`RegistryError::AlreadyPublished`], also before
    /// anything is fetched.
    pub async fn publish(&self, request: &PublishRequest) -> Result<Artifact> {
        let (inflight, _drained) = Inflight::new();
        self.run(request, inflight).await
    }

    /// Publish unless `cancel` completes first
    ///
    /// Cancelling drops the in-flight pipeline, which releases its scratch
    /// resources the same way a failure does. Blocking work the pipeline
    /// started is told to stop and waited for, so nothing is left on disk
    /// once [`RegistryError::Cancelled`] is returned.
    pub async fn publish_until<C>(&self, request: &PublishRequest, cancel: C) -> Result<Artifact>
    where
        C: Future<Output = ()>,
    {
        let (inflight, mut drained) = Inflight::new();

        tokio::select! {
            result = self.run(request, inflight.clone()) => result,
            () = cancel => {
                inflight.cancel();
                drop(inflight);
                // resolves once every blocking task has dropped its handle
                let _ = drained.recv().await;
                warn!(package = %request.package, version = %request.version, "publish cancelled");
                Err(RegistryError::Cancelled)
            }
        }
    }

    async fn run(&self, request: &PublishRequest, inflight: Inflight) -> Result<Artifact> {
        let packager = self.collaborators.packager(request.format)?;
        let fetcher = self.collaborators.fetcher(request.vcs)?;
        let uploader = self.collaborators.uploader(request.storage)?;
        request.validate()?;

        if self
            .persister
            .version_exists(&request.package, &request.version)
            .await?
        {
            return Err(RegistryError::AlreadyPublished {
                name: request.package.clone(),
                version: request.version.clone(),
            });
        }

        info!(
            package = %request.package,
            version = %request.version,
            format = %request.format,
            vcs = %request.vcs,
            storage = %request.storage,
            "publishing"
        );

        let uri = with_scratch_dir(|dir| async move {
            fetch_and_extract(fetcher, request, &dir, &inflight).await?;
            package_and_upload(packager, uploader, request, dir.path()).await
        })
        .await?;

        let artifact = Artifact::new(&request.package, &request.description, request.format)
            .with_version(ArtifactVersion::new(&request.version, &uri));

        let persisted = self
            .persister
            .create_artifact(artifact)
            .await
            .map_err(|e| RegistryError::Persist {
                name: request.package.clone(),
                version: request.version.clone(),
                source: Box::new(e),
            })?;

        info!(package = %request.package, version = %request.version, %uri, "published");
        Ok(persisted)
    }
}

/// Blocking work started by one publish
///
/// Every blocking task holds a clone until it has stopped touching scratch
/// resources. The receiver returned by [`Inflight::new`] sees the channel
/// close once the last clone is gone.
#[derive(Clone)]
struct Inflight {
    cancelled: Arc<AtomicBool>,
    _done: mpsc::Sender<()>,
}

impl Inflight {
    fn new() -> (Self, mpsc::Receiver<()>) {
        let (done, drained) = mpsc::channel(1);
        let inflight = Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            _done: done,
        };
        (inflight, drained)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Reader that fails once its publish has been cancelled
struct CancellableRead<R> {
    inner: R,
    inflight: Inflight,
}

impl<R: Read> Read for CancellableRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inflight.is_cancelled() {
            return Err(io::Error::other("publish cancelled"));
        }
        self.inner.read(buf)
    }
}

async fn fetch_and_extract(
    fetcher: &dyn VcsFetcher,
    request: &PublishRequest,
    dir: &Arc<ScratchDir>,
    inflight: &Inflight,
) -> Result<()> {
    with_scratch_file(|mut file| async move {
        fetcher
            .fetch_archive(&mut file, &request.repository, &request.vcs_options())
            .await
            .map_err(|source| RegistryError::Fetch {
                repo: request.repository.clone(),
                source,
            })?;
        rewind(&mut file).await?;
        info!(repository = %request.repository, reference = %request.reference, "fetched");

        let src = CancellableRead {
            inner: file.into_std().await,
            inflight: inflight.clone(),
        };
        let dest = dir.clone();
        let running = inflight.clone();
        run_blocking(move || {
            let options = ExtractOptions::new().strip_components(1);
            let result = extract(BufReader::new(src), ArchiveFormat::TarGz, dest.path(), &options);
            if result.is_err() {
                debug!(dir = %dest.path().display(), "extraction stopped");
            }
            // the directory goes before completion is signalled
            drop(dest);
            drop(running);
            result
        })
        .await??;

        info!(dir = %dir.path().display(), "extracted");
        Ok::<_, RegistryError>(())
    })
    .await
}

async fn package_and_upload(
    packager: &dyn Packager,
    uploader: &dyn Uploader,
    request: &PublishRequest,
    dir: &Path,
) -> Result<String> {
    with_scratch_file(|mut file| async move {
        let options = PackageOptions {
            dir: dir.to_path_buf(),
            package: request.package.clone(),
            version: request.version.clone(),
        };
        packager
            .package(&mut file, &options)
            .await
            .map_err(|source| RegistryError::Package {
                format: request.format.to_string(),
                source,
            })?;
        rewind(&mut file).await?;
        info!(format = %request.format, "packaged");

        let path = request.storage_path();
        let uri = uploader
            .write(&mut file, &path)
            .await
            .map_err(|source| RegistryError::Upload {
                path: path.clone(),
                source,
            })?;

        info!(%path, %uri, "uploaded");
        Ok::<_, RegistryError>(uri)
    })
    .await
}

/// Run blocking work off the async runtime, resuming any panic it raised
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(e.into()),
    }
}
