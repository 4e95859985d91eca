//! Collaborators that ship with depot
//!
//! - [`LocalFetcher`] archives a directory on the local filesystem
//! - [`TarballPackager`] packages sources as a gzip-compressed tarball
//! - [`RouterUploader`] stores packages through a [`crate::StorageRouter`]

mod local_fetcher;
mod router_uploader;
mod tarball_packager;

pub use local_fetcher::LocalFetcher;
pub use router_uploader::RouterUploader;
pub use tarball_packager::TarballPackager;
