use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::collaborators::Uploader;
use crate::entities::StorageKind;
use crate::error::{BoxError, RegistryError};
use crate::storage::{StorageRouter, routing_root};

/// Uploads below a root URI through the storage router
///
/// A package uploaded to `tgz/pkg@v1.tar.gz` with root `mem://artifacts`
/// lands at `mem://artifacts/tgz/pkg@v1.tar.gz`. The root must be covered by
/// a backend registered with the router.
///
/// Uploads never replace an existing object; writing to a URI that is
/// already taken fails with [`RegistryError::ObjectExists`].
#[derive(Clone)]
pub struct RouterUploader {
    kind: StorageKind,
    root: String,
    router: Arc<StorageRouter>,
}

impl RouterUploader {
    pub fn new(kind: StorageKind, root: &str, router: Arc<StorageRouter>) -> Self {
        Self {
            kind,
            root: routing_root(root).trim_end_matches('/').to_string(),
            router,
        }
    }

    pub fn uri_for(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Uploader for RouterUploader {
    fn kind(&self) -> StorageKind {
        self.kind
    }

    async fn write(
        &self,
        src: &mut (dyn AsyncRead + Unpin + Send),
        path: &str,
    ) -> Result<String, BoxError> {
        let uri = self.uri_for(path);
        if self.router.exists(&uri).await? {
            return Err(RegistryError::ObjectExists(uri).into());
        }
        self.router.write(&uri, src).await?;
        Ok(uri)
    }
}
