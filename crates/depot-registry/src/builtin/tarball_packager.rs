use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use depot::{ArchiveFormat, CompressOptions, compress};

use crate::collaborators::{PackageOptions, Packager};
use crate::entities::PackageFormat;
use crate::error::BoxError;
use crate::publisher::run_blocking;

/// Packages sources as a gzip-compressed tarball
///
/// Everything is placed below a single `<package>@<version>/` directory.
#[derive(Debug, Clone, Default)]
pub struct TarballPackager;

impl TarballPackager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Packager for TarballPackager {
    fn format(&self) -> PackageFormat {
        PackageFormat::Tarball
    }

    async fn package(
        &self,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
        options: &PackageOptions,
    ) -> Result<(), BoxError> {
        let dir = options.dir.clone();
        let top = format!("{}@{}", options.package, options.version);

        let archive = run_blocking(move || {
            let options = CompressOptions::new().prefix_components([top]);
            compress(Vec::new(), ArchiveFormat::TarGz, &dir, &options)
        })
        .await??;

        dest.write_all(&archive).await?;
        dest.flush().await?;
        Ok(())
    }
}
