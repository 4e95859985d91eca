use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use super::{ArchiveFormat, ExtractOptions};
use crate::error::{ArchiveError, Result};

/// Unpack an archive of the given format from `src` into `dest`
///
/// Only regular files are written; directories are created as parents of
/// the files that need them. Every entry is joined onto `dest` and cleaned
/// before anything is written, so `/abs/file` lands at `dest/abs/file`.
/// Extraction stops with [`ArchiveError::IllegalPath`] as soon as an entry
/// would resolve outside `dest`.
pub fn extract<R: Read>(
    src: R,
    format: ArchiveFormat,
    dest: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<()> {
    let dest = dest.as_ref();

    if format.is_gzipped() {
        let decoder = GzDecoder::new(src);
        if decoder.header().is_none() {
            return Err(ArchiveError::Gzip(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid gzip header",
            )));
        }
        untar(decoder, dest, options)
    } else {
        untar(src, dest, options)
    }
}

fn untar<R: Read>(src: R, dest: &Path, options: &ExtractOptions) -> Result<()> {
    let mut archive = Archive::new(src);
    let entries = archive.entries().map_err(ArchiveError::ReadHeader)?;

    for entry in entries {
        let mut entry = entry.map_err(ArchiveError::ReadHeader)?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let Some(stripped) = strip_components(&name, options.stripped()) else {
            continue;
        };

        let path = resolve(dest, &stripped).ok_or_else(|| ArchiveError::IllegalPath { path: name.clone() })?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let mode = entry.header().mode().map_err(ArchiveError::ReadHeader)?;
        write_file(&mut entry, &path, mode)?;
        debug!(entry = %name, path = %path.display(), "extracted file");
    }

    Ok(())
}

fn write_file(content: &mut impl Read, path: &Path, mode: u32) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ArchiveError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let mut open = OpenOptions::new();
    open.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        open.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut out = open.open(path).map_err(|source| ArchiveError::CreateFile {
        path: path.to_path_buf(),
        source,
    })?;

    io::copy(content, &mut out).map_err(|source| ArchiveError::WriteFile {
        path: path.to_path_buf(),
        source,
    })?;

    out.sync_all().map_err(|source| ArchiveError::CloseFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove the first `n` segments of an entry name.
///
/// Returns `None` when nothing is left, i.e. the entry is one of the
/// stripped directories itself.
fn strip_components(name: &str, n: usize) -> Option<String> {
    if n == 0 {
        return Some(name.to_string());
    }

    let rest = name.splitn(n + 1, '/').nth(n)?;
    (!rest.is_empty()).then(|| rest.to_string())
}

/// Join `name` onto `dest` lexically, refusing anything that ends up
/// outside of `dest`. A leading `/` is joined like any other separator.
fn resolve(dest: &Path, name: &str) -> Option<PathBuf> {
    let mut resolved = dest.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                resolved.pop();
                depth -= 1;
            }
            Component::Prefix(_) => return None,
        }
    }

    Some(resolved)
}
