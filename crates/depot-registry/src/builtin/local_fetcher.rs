use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use depot::{ArchiveFormat, CompressOptions, compress};

use crate::collaborators::{VcsFetcher, VcsOptions};
use crate::entities::VcsKind;
use crate::error::{BoxError, RegistryError};
use crate::publisher::run_blocking;

/// Fetches from a repository checked out on the local filesystem
///
/// The repository identifier is a directory path. The archive is laid out
/// the way hosted VCS archives are: everything sits below one top-level
/// directory named `<repository base name>-<reference>`. The reference only
/// names that directory; whatever is on disk gets archived.
#[derive(Debug, Clone, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    pub fn new() -> Self {
        Self
    }

    fn source_dir(repository: &Path, subdir: Option<&str>) -> Result<PathBuf, RegistryError> {
        let Some(subdir) = subdir.filter(|s| !s.is_empty()) else {
            return Ok(repository.to_path_buf());
        };

        let mut dir = repository.to_path_buf();
        for component in Path::new(subdir).components() {
            match component {
                Component::Normal(part) => dir.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(RegistryError::Invalid(format!(
                        "subdir {subdir} leaves the repository"
                    )));
                }
            }
        }
        Ok(dir)
    }

    fn top_level_dir(repository: &Path, reference: &str) -> String {
        let base = repository
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repository".to_string());
        format!("{}-{}", base, reference.replace('/', "-"))
    }
}

#[async_trait]
impl VcsFetcher for LocalFetcher {
    fn kind(&self) -> VcsKind {
        VcsKind::Local
    }

    async fn fetch_archive(
        &self,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
        repository: &str,
        options: &VcsOptions,
    ) -> Result<(), BoxError> {
        let repository = Path::new(repository);
        let src = Self::source_dir(repository, options.subdir.as_deref())?;
        let top = Self::top_level_dir(repository, &options.reference);
        debug!(src = %src.display(), top = %top, "archiving local repository");

        let archive = run_blocking(move || {
            let options = CompressOptions::new().prefix_components([top]);
            compress(Vec::new(), ArchiveFormat::TarGz, &src, &options)
        })
        .await??;

        dest.write_all(&archive).await?;
        dest.flush().await?;
        Ok(())
    }
}
