use std::fs::{self, File, Metadata};
use std::io::{self, Write};
use std::path::{Component, Path};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, Header};
use tracing::debug;

use super::{ArchiveFormat, CompressOptions};
use crate::error::{ArchiveError, Result};

/// Write `src` as an archive of the given format into `dest`
///
/// The walk is depth-first with entries sorted by name inside each
/// directory. The root entry is named after the source directory (or after
/// the prefix, when one is configured); directory entries end with `/`.
/// Symlinks below the source directory are neither followed nor archived.
///
/// Both the tar trailer and, for [`ArchiveFormat::TarGz`], the gzip footer
/// are written before the destination is handed back.
pub fn compress<W: Write>(
    dest: W,
    format: ArchiveFormat,
    src: impl AsRef<Path>,
    options: &CompressOptions,
) -> Result<W> {
    let src = src.as_ref();
    let wrap = |source: io::Error| ArchiveError::Compress {
        src: src.to_path_buf(),
        source,
    };

    if format.is_gzipped() {
        let mut builder = Builder::new(GzEncoder::new(dest, Compression::default()));
        write_tree(&mut builder, src, options).map_err(wrap)?;
        let encoder = builder.into_inner().map_err(wrap)?;
        encoder.finish().map_err(wrap)
    } else {
        let mut builder = Builder::new(dest);
        write_tree(&mut builder, src, options).map_err(wrap)?;
        builder.into_inner().map_err(wrap)
    }
}

fn write_tree<W: Write>(builder: &mut Builder<W>, src: &Path, options: &CompressOptions) -> io::Result<()> {
    let prefix = options.prefix();
    let root_name = if prefix.is_empty() {
        base_name(src)?
    } else {
        prefix.clone()
    };

    let meta = fs::metadata(src)?;
    if !meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a directory: {}", src.display()),
        ));
    }

    append_dir(builder, &meta, &format!("{root_name}/"))?;
    walk(builder, src, src, &prefix)
}

fn walk<W: Write>(builder: &mut Builder<W>, root: &Path, dir: &Path, prefix: &str) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_symlink() {
            debug!(path = %path.display(), "skipping symlink");
            continue;
        }

        let meta = entry.metadata()?;
        let relative = path
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let name = entry_name(prefix, relative);

        if meta.is_dir() {
            append_dir(builder, &meta, &format!("{name}/"))?;
            walk(builder, root, &path, prefix)?;
        } else if meta.is_file() {
            let mut header = Header::new_gnu();
            header.set_metadata(&meta);
            header.set_size(meta.len());
            builder.append_data(&mut header, &name, File::open(&path)?)?;
        }
    }

    Ok(())
}

fn append_dir<W: Write>(builder: &mut Builder<W>, meta: &Metadata, name: &str) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_metadata(meta);
    header.set_size(0);
    builder.append_data(&mut header, name, io::empty())
}

fn entry_name(prefix: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    if prefix.is_empty() {
        relative
    } else {
        format!("{prefix}/{relative}")
    }
}

fn base_name(src: &Path) -> io::Result<String> {
    if let Some(name) = src.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }

    // `.` and friends have no file name of their own
    let canonical = src.canonicalize()?;
    Ok(canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_entry_name_with_and_without_prefix() {
        let relative = PathBuf::from("pkg").join("info").join("info.go");
        assert_eq!(entry_name("", &relative), "pkg/info/info.go");
        assert_eq!(entry_name("repo/sub", &relative), "repo/sub/pkg/info/info.go");
    }

    #[test]
    fn test_compress_rejects_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = compress(Vec::new(), ArchiveFormat::Tar, &missing, &CompressOptions::new()).unwrap_err();
        match err {
            ArchiveError::Compress { src, .. } => assert_eq!(src, missing),
            other => panic!("Expected Compress error, got {other:?}"),
        }
    }

    #[test]
    fn test_root_entry_uses_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("gomodule");
        fs::create_dir_all(src.join("pkg")).unwrap();
        fs::write(src.join("go.mod"), "module example.com/m\n").unwrap();

        let bytes = compress(Vec::new(), ArchiveFormat::Tar, &src, &CompressOptions::new()).unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let names = archive
            .entries()
            .unwrap()
            .map(|entry| String::from_utf8_lossy(&entry.unwrap().path_bytes()).into_owned())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["gomodule/", "go.mod", "pkg/"]);
    }
}
