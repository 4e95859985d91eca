//! S3-compatible storage implementation using MinIO client
//!
//! Backs `s3://` roots. It works with AWS S3, MinIO, and any S3-compatible
//! object storage.

use async_trait::async_trait;
use bytes::Bytes;
use minio::s3::{client::Client, creds::StaticProvider, http::BaseUrl, segmented_bytes::SegmentedBytes, types::S3Api};
use std::str::FromStr;
use tracing::debug;

use super::{BlobStorage, RootUri, StorageError};

/// S3-compatible storage implementation using MinIO client
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage instance
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: String::new(),
        }
    }

    /// Store every key below `prefix` inside the bucket
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Open storage for a parsed `s3://bucket[/prefix]?endpoint=<url>` root
    ///
    /// Credentials are read from `S3_ACCESS_KEY_ID` and `S3_SECRET_ACCESS_KEY`
    /// when both are set; otherwise requests are sent anonymously. The
    /// endpoint falls back to `S3_ENDPOINT_URL`.
    pub async fn open(root: &RootUri) -> Result<Self, StorageError> {
        let (bucket, prefix) = match root.location.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix),
            None => (root.location.as_str(), ""),
        };
        if bucket.is_empty() {
            return Err(StorageError::InvalidRoot(root.uri.clone()));
        }

        let endpoint_url = match root.params.get("endpoint") {
            Some(endpoint) => endpoint.clone(),
            None => std::env::var("S3_ENDPOINT_URL").map_err(|_| {
                StorageError::Backend(format!(
                    "no endpoint for {}: set ?endpoint= or S3_ENDPOINT_URL",
                    root.uri
                ))
            })?,
        };

        let base_url = BaseUrl::from_str(&endpoint_url)
            .map_err(|e| StorageError::Backend(format!("Invalid S3 endpoint '{}': {}", endpoint_url, e)))?;

        let client = match (
            std::env::var("S3_ACCESS_KEY_ID"),
            std::env::var("S3_SECRET_ACCESS_KEY"),
        ) {
            (Ok(access_key), Ok(secret_key)) => {
                let creds_provider = StaticProvider::new(&access_key, &secret_key, None);
                Client::new(base_url, Some(Box::new(creds_provider)), None, None)
            }
            _ => Client::new(base_url, None, None, None),
        }
        .map_err(|e| StorageError::Backend(format!("Failed to create S3 client: {}", e)))?;

        let storage = Self::new(client, bucket).with_prefix(prefix);
        if root.flag("create_bucket") {
            storage.ensure_bucket().await?;
        }

        Ok(storage)
    }

    /// Ensure bucket exists (create if it doesn't)
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        match self.client.bucket_exists(&self.bucket).send().await {
            Ok(response) => {
                if response.exists {
                    Ok(())
                } else {
                    debug!(bucket = %self.bucket, "creating bucket");
                    match self.client.create_bucket(&self.bucket).send().await {
                        Ok(_) => Ok(()),
                        Err(e) => Err(StorageError::Backend(format!(
                            "Failed to create bucket '{}': {}",
                            self.bucket, e
                        ))),
                    }
                }
            }
            Err(e) => Err(StorageError::Backend(format!(
                "Failed to check bucket '{}': {}",
                self.bucket, e
            ))),
        }
    }

    /// Validate S3 key format
    fn validate_key(key: &str) -> Result<(), StorageError> {
        if key.is_empty() || key.len() > 1024 {
            return Err(StorageError::InvalidKey(
                "Key must be between 1 and 1024 characters".into(),
            ));
        }

        if key.starts_with('/') || key.ends_with('/') {
            return Err(StorageError::InvalidKey(
                "Key cannot start or end with '/'".into(),
            ));
        }

        Ok(())
    }

    fn object_key(&self, key: &str) -> Result<String, StorageError> {
        let full = if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        };
        Self::validate_key(&full)?;
        Ok(full)
    }
}

fn is_not_found(e: &impl std::fmt::Display) -> bool {
    let message = e.to_string();
    message.contains("NoSuchKey") || message.contains("404")
}

#[async_trait]
impl BlobStorage for S3Storage {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let key = self.object_key(key)?;
        let bytes = SegmentedBytes::from(Bytes::from(data));

        self.client
            .put_object(&self.bucket, key.as_str(), bytes)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to put file '{}': {}", key, e)))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.object_key(key)?;

        let response = self
            .client
            .get_object(&self.bucket, key.as_str())
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StorageError::NotFound(key.clone())
                } else {
                    StorageError::Backend(format!("Failed to get file '{}': {}", key, e))
                }
            })?;

        let content = response.content.to_segmented_bytes().await.map_err(|e| {
            StorageError::Backend(format!("Failed to read file '{}' content: {}", key, e))
        })?;

        Ok(content.to_bytes().to_vec())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let key = self.object_key(key)?;

        match self.client.stat_object(&self.bucket, key.as_str()).send().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::Backend(format!(
                "Failed to check existence of file '{}': {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = self.object_key(key)?;

        self.client
            .delete_object(&self.bucket, key.as_str())
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to delete file '{}': {}", key, e)))?;

        Ok(())
    }
}
