//! # Depot Registry
//!
//! Publishes source code as versioned artifacts:
//! - Fetch a repository archive through a [`VcsFetcher`]
//! - Repackage it with a [`Packager`] for the requested format
//! - Upload the package with an [`Uploader`], usually into a [`StorageRouter`]
//! - Record the artifact version with a [`Persister`]
//!
//! ## Core Concepts
//!
//! - **Artifacts** are named, their **versions** are insert-only
//! - **Storage roots** are URIs such as `file:///var/lib/depot` or
//!   `mem://artifacts`; the router sends every URI to the backend with the
//!   longest matching root
//! - **Collaborators** are looked up by kind tag from a registry built once
//!   at startup
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use depot_registry::*;
//! use depot_registry::builtin::{LocalFetcher, RouterUploader, TarballPackager};
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let router = Arc::new(StorageRouter::new());
//! router.register_backends(&["file:///var/lib/depot?create_dir=1"]).await?;
//!
//! let collaborators = Collaborators::new()
//!     .with_fetcher(LocalFetcher::new())
//!     .with_packager(TarballPackager::new())
//!     .with_uploader(RouterUploader::new(
//!         StorageKind::FileSystem,
//!         "file:///var/lib/depot",
//!         router.clone(),
//!     ));
//!
//! let persister = Arc::new(SqliteStorage::new("sqlite:./data/depot.db").await?);
//! let publisher = Publisher::new(collaborators, persister);
//!
//! let artifact = publisher
//!     .publish(&PublishRequest {
//!         format: PackageFormat::Tarball,
//!         storage: StorageKind::FileSystem,
//!         vcs: VcsKind::Local,
//!         repository: "/src/widgets".to_string(),
//!         reference: "v1.0.0".to_string(),
//!         subdir: None,
//!         package: "widgets".to_string(),
//!         description: "Widget library".to_string(),
//!         version: "v1.0.0".to_string(),
//!     })
//!     .await?;
//!
//! println!("published {}", artifact.versions[0].uri);
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod collaborators;
pub mod entities;
pub mod error;
pub mod publisher;
pub mod storage;

#[cfg(feature = "sqlite")]
pub mod unit_of_work;

pub use collaborators::{
    Collaborators, PackageOptions, Packager, Persister, Uploader, VcsFetcher, VcsOptions,
};
pub use entities::{Artifact, ArtifactVersion, PackageFormat, StorageKind, VcsKind};
pub use error::{BoxError, RegistryError, Result};
pub use publisher::{PublishRequest, Publisher};
pub use storage::{BlobStorage, FileStorage, MemoryStorage, StorageError, StorageRouter};

#[cfg(feature = "sqlite")]
pub use storage::sqlite_storage::SqliteStorage;

#[cfg(feature = "s3")]
pub use storage::s3_storage::S3Storage;
