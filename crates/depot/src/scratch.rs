//! Scoped scratch files and directories
//!
//! Each helper acquires a fresh temporary resource, runs the continuation it
//! is given and removes the resource again on every way out: a returned
//! value, a returned error, a panic, or the surrounding future being dropped.
//!
//! A scratch directory is shared through an [`Arc`]. Blocking work that
//! writes into it holds a clone, and the directory is removed when the last
//! clone is dropped, never while someone may still be writing to it.

use std::future::Future;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use crate::error::ScratchError;

const SCRATCH_PREFIX: &str = "depot-";
const SCRATCH_FILE: &str = "file.tmp";

/// Owns a temporary directory and removes it when dropped
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
}

impl ScratchDir {
    pub fn new() -> Result<Self, ScratchError> {
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .map_err(ScratchError::CreateDir)?;

        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        self.dir.as_ref().map(TempDir::path).unwrap_or_else(|| Path::new(""))
    }

    /// Remove the directory now, logging rather than returning any failure
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove scratch dir");
            }
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Run `f` with a fresh scratch directory
///
/// The directory is removed once `f` has finished and every clone of the
/// handle it was given has been dropped.
pub async fn with_scratch_dir<F, Fut, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce(Arc<ScratchDir>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ScratchError>,
{
    let dir = Arc::new(ScratchDir::new()?);
    f(dir).await
}

/// Run `f` with a fresh, empty scratch file opened for reading and writing
///
/// The file lives in its own scratch directory; both are removed afterwards.
pub async fn with_scratch_file<F, Fut, T, E>(f: F) -> Result<T, E>
where
    F: FnOnce(File) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ScratchError>,
{
    let dir = ScratchDir::new()?;
    let path = dir.path().join(SCRATCH_FILE);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(|source| ScratchError::CreateFile { path, source })?;

    let result = f(file).await;
    dir.close();
    result
}

/// Flush pending writes and move the cursor back to the start of the file
pub async fn rewind(file: &mut File) -> Result<(), ScratchError> {
    file.flush().await.map_err(ScratchError::Seek)?;
    file.seek(SeekFrom::Start(0)).await.map_err(ScratchError::Seek)?;
    Ok(())
}
