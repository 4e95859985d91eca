//! Depot is the leaf library of the artifact publisher: it turns directory
//! trees into tar/gzip streams and back, and hands out scratch files and
//! directories that clean up after themselves.

pub mod archive;
pub mod error;
pub mod scratch;

pub use archive::{ArchiveFormat, CompressOptions, ExtractOptions, compress, extract};
pub use error::{ArchiveError, Result, ScratchError};
pub use scratch::{ScratchDir, rewind, with_scratch_dir, with_scratch_file};

/// Get the library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
