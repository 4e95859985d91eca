//! Routes URIs to the storage backend mounted at their longest matching root
//!
//! The router keeps an immutable snapshot of mounts behind a
//! [`tokio::sync::RwLock`]. Readers hold the shared lock for the duration of
//! the I/O they route; registration builds a complete new snapshot first and
//! swaps it in under the exclusive lock, so a failed registration leaves the
//! previous backends active.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{BlobStorage, StorageError, open_backend, routing_root};
use crate::error::{RegistryError, Result};

struct Mount {
    root: String,
    storage: Arc<dyn BlobStorage>,
}

impl Mount {
    /// The backend key for `uri`, if this mount owns it
    ///
    /// A root only matches at a path boundary: `mem://tmp` owns
    /// `mem://tmp/a` but not `mem://tmpfoo/a`.
    fn key_for<'u>(&self, uri: &'u str) -> Option<&'u str> {
        let rest = uri.strip_prefix(self.root.as_str())?;
        if rest.is_empty() || rest.starts_with('/') || self.root.ends_with('/') {
            Some(rest.trim_start_matches('/'))
        } else {
            None
        }
    }
}

/// Longest-prefix router over registered storage backends
pub struct StorageRouter {
    mounts: RwLock<Arc<[Mount]>>,
}

impl Default for StorageRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageRouter {
    /// Create a router with no backends
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Open a backend for every root and replace the registered set
    ///
    /// Every backend is opened before the swap. If any root fails to open the
    /// error names it and the previously registered backends stay in place.
    pub async fn register_backends<S: AsRef<str>>(&self, roots: &[S]) -> Result<()> {
        let mut mounts = Vec::with_capacity(roots.len());
        for root in roots {
            let root = root.as_ref();
            let storage = open_backend(root)
                .await
                .map_err(|source| RegistryError::OpenStorage {
                    root: root.to_string(),
                    source,
                })?;
            mounts.push(Mount {
                root: routing_root(root).to_string(),
                storage,
            });
        }

        self.swap(mounts).await;
        Ok(())
    }

    /// Replace the registered set with already constructed backends
    pub async fn register_storages<I, S>(&self, storages: I)
    where
        I: IntoIterator<Item = (S, Arc<dyn BlobStorage>)>,
        S: AsRef<str>,
    {
        let mounts = storages
            .into_iter()
            .map(|(root, storage)| Mount {
                root: routing_root(root.as_ref()).to_string(),
                storage,
            })
            .collect();

        self.swap(mounts).await;
    }

    async fn swap(&self, mut mounts: Vec<Mount>) {
        mounts.sort_by(|a, b| b.root.len().cmp(&a.root.len()));
        let roots: Vec<&str> = mounts.iter().map(|m| m.root.as_str()).collect();
        info!(?roots, "registering storage backends");

        let mut current = self.mounts.write().await;
        *current = Arc::from(mounts);
    }

    /// Registered roots, longest first
    pub async fn roots(&self) -> Vec<String> {
        self.mounts
            .read()
            .await
            .iter()
            .map(|m| m.root.clone())
            .collect()
    }

    /// Copy the object at `uri` into `dest`
    pub async fn read(&self, uri: &str, dest: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let mounts = self.mounts.read().await;
        let (storage, key) = resolve(&mounts, uri)?;
        debug!(uri, key, "reading from storage");

        let data = storage.get(key).await.map_err(|e| storage_error(uri, e))?;
        dest.write_all(&data).await?;
        dest.flush().await?;
        Ok(data.len() as u64)
    }

    /// Store everything `src` yields at `uri`
    pub async fn write(&self, uri: &str, src: &mut (dyn AsyncRead + Unpin + Send)) -> Result<u64> {
        let mounts = self.mounts.read().await;
        let (storage, key) = resolve(&mounts, uri)?;
        debug!(uri, key, "writing to storage");

        let mut data = Vec::new();
        src.read_to_end(&mut data).await?;
        let written = data.len() as u64;
        storage.put(key, data).await.map_err(|e| storage_error(uri, e))?;
        Ok(written)
    }

    pub async fn exists(&self, uri: &str) -> Result<bool> {
        let mounts = self.mounts.read().await;
        let (storage, key) = resolve(&mounts, uri)?;
        storage.exists(key).await.map_err(|e| storage_error(uri, e))
    }

    pub async fn delete(&self, uri: &str) -> Result<()> {
        let mounts = self.mounts.read().await;
        let (storage, key) = resolve(&mounts, uri)?;
        debug!(uri, key, "deleting from storage");
        storage.delete(key).await.map_err(|e| storage_error(uri, e))
    }
}

fn resolve<'m, 'u>(mounts: &'m [Mount], uri: &'u str) -> Result<(&'m dyn BlobStorage, &'u str)> {
    mounts
        .iter()
        .find_map(|mount| mount.key_for(uri).map(|key| (mount.storage.as_ref(), key)))
        .ok_or_else(|| RegistryError::NoStorageForPath(uri.to_string()))
}

fn storage_error(uri: &str, source: StorageError) -> RegistryError {
    RegistryError::Storage {
        uri: uri.to_string(),
        source,
    }
}
