//! Filesystem blob storage backing `file://` roots
//!
//! Keys map to paths below the root directory. Writes go to a temporary
//! sibling first and are renamed into place, so readers never observe a
//! half-written object.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::{BlobStorage, RootUri, StorageError};

/// Blob storage rooted at a local directory
///
/// Root options:
/// - `create_dir=1` creates the root directory when it does not exist yet
/// - `no_tmp_dir=1` writes objects in place instead of through a temporary file
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    atomic_writes: bool,
}

impl FileStorage {
    /// Create storage for an existing directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            atomic_writes: true,
        }
    }

    /// Open storage for a parsed `file://` root
    pub async fn open(root: &RootUri) -> Result<Self, StorageError> {
        if root.location.is_empty() {
            return Err(StorageError::InvalidRoot(root.uri.clone()));
        }

        let dir = PathBuf::from(&root.location);
        if root.flag("create_dir") {
            fs::create_dir_all(&dir).await?;
        }

        let meta = fs::metadata(&dir)
            .await
            .map_err(|e| StorageError::Backend(format!("{}: {}", dir.display(), e)))?;
        if !meta.is_dir() {
            return Err(StorageError::InvalidRoot(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        Ok(Self {
            root: dir,
            atomic_writes: !root.flag("no_tmp_dir"),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path below the root, rejecting keys that leave it
    fn key_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("Key must not be empty".into()));
        }

        let mut path = self.root.clone();
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl BlobStorage for FileStorage {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if !self.atomic_writes {
            fs::write(&path, data).await?;
            return Ok(());
        }

        let tmp = path.with_file_name(format!(".{}.tmp", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.key_path(key)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            ErrorKind::PermissionDenied => StorageError::AccessDenied(key.to_string()),
            _ => StorageError::Io(e),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.key_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_storage_basic_operations() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage.put("sub/dir/file.txt", b"sub dir content".to_vec()).await.unwrap();
        assert_eq!(storage.get("sub/dir/file.txt").await.unwrap(), b"sub dir content");
        assert!(dir.path().join("sub/dir/file.txt").is_file());
        assert!(storage.exists("sub/dir/file.txt").await.unwrap());

        storage.delete("sub/dir/file.txt").await.unwrap();
        assert!(!storage.exists("sub/dir/file.txt").await.unwrap());
        assert!(matches!(
            storage.get("sub/dir/file.txt").await,
            Err(StorageError::NotFound(_))
        ));

        // leaves no temporary files behind
        let leftovers = std::fs::read_dir(dir.path().join("sub/dir")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_file_storage_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        for key in ["../outside.txt", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(storage.put(key, b"x".to_vec()).await, Err(StorageError::InvalidKey(_))),
                "key {key:?} was accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_open_with_create_dir() {
        let dir = tempdir().unwrap();
        let root_dir = dir.path().join("nested/root");
        let root = RootUri::parse(&format!("file://{}?create_dir=1", root_dir.display())).unwrap();

        let storage = FileStorage::open(&root).await.unwrap();
        assert_eq!(storage.root(), root_dir.as_path());
        assert!(root_dir.is_dir());
    }

    #[tokio::test]
    async fn test_open_missing_dir_without_create() {
        let dir = tempdir().unwrap();
        let root = RootUri::parse(&format!("file://{}/missing", dir.path().display())).unwrap();

        assert!(FileStorage::open(&root).await.is_err());
    }
}
