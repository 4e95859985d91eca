//! Storage abstraction for published artifacts and registry metadata
//!
//! Object backends are opened from scheme-qualified root URIs:
//!
//! | scheme    | backend           | example                                   |
//! |-----------|-------------------|-------------------------------------------|
//! | `mem://`  | [`MemoryStorage`] | `mem://artifacts`                         |
//! | `file://` | [`FileStorage`]   | `file:///var/lib/depot?create_dir=1`      |
//! | `s3://`   | `S3Storage`       | `s3://bucket?endpoint=http://minio:9000`  |
//!
//! The query string carries backend options and is not part of the root
//! used when routing URIs with [`StorageRouter`].

use std::collections::HashMap;
use std::sync::Arc;

pub mod blob_storage;
pub mod file_storage;
pub mod router;

#[cfg(feature = "s3")]
pub mod s3_storage;

#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use blob_storage::{BlobStorage, MemoryStorage, StorageError};
pub use file_storage::FileStorage;
pub use router::StorageRouter;

/// A storage root URI split into its routing prefix and backend options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootUri {
    /// The root without its query string
    pub uri: String,
    pub scheme: String,
    /// Everything between `scheme://` and the query string
    pub location: String,
    pub params: HashMap<String, String>,
}

impl RootUri {
    pub fn parse(root: &str) -> Result<Self, StorageError> {
        let (uri, query) = match root.split_once('?') {
            Some((uri, query)) => (uri, query),
            None => (root, ""),
        };

        let (scheme, location) = uri
            .split_once("://")
            .ok_or_else(|| StorageError::InvalidRoot(root.to_string()))?;

        if scheme.is_empty() {
            return Err(StorageError::InvalidRoot(root.to_string()));
        }

        let params = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        Ok(Self {
            uri: uri.to_string(),
            scheme: scheme.to_ascii_lowercase(),
            location: location.to_string(),
            params,
        })
    }

    /// True when the flag is present with a truthy value (`1`, `true`, `yes`)
    pub fn flag(&self, name: &str) -> bool {
        self.params
            .get(name)
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"))
    }
}

/// Strip the query string from a root URI
pub fn routing_root(root: &str) -> &str {
    root.split_once('?').map(|(uri, _)| uri).unwrap_or(root)
}

/// Open the backend a root URI points at
pub async fn open_backend(root: &str) -> Result<Arc<dyn BlobStorage>, StorageError> {
    let parsed = RootUri::parse(root)?;

    match parsed.scheme.as_str() {
        "mem" => Ok(Arc::new(MemoryStorage::new())),
        "file" => Ok(Arc::new(FileStorage::open(&parsed).await?)),
        #[cfg(feature = "s3")]
        "s3" => Ok(Arc::new(s3_storage::S3Storage::open(&parsed).await?)),
        other => Err(StorageError::UnsupportedScheme(other.to_string())),
    }
}
