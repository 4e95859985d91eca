use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use depot::{ArchiveError, ArchiveFormat, CompressOptions, ExtractOptions, compress, extract};
use flate2::Compression;
use flate2::write::GzEncoder;
use proptest::prelude::*;
use tempfile::tempdir;

fn write_tree(root: &Path, files: &BTreeMap<String, Vec<u8>>) {
    for (name, content) in files {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn visit(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                visit(root, &path, out);
            } else {
                let name = path
                    .strip_prefix(root)
                    .unwrap()
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                out.insert(name, fs::read(&path).unwrap());
            }
        }
    }

    let mut out = BTreeMap::new();
    visit(root, root, &mut out);
    out
}

fn gzipped_tar(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Builds a tar whose single entry name bypasses the builder's own path checks
fn tar_with_raw_name(name: &str, data: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, data).unwrap();
    builder.into_inner().unwrap()
}

fn sample_files() -> BTreeMap<String, Vec<u8>> {
    BTreeMap::from([
        ("README.md".to_string(), b"# Details about this package".to_vec()),
        ("bin/executable".to_string(), b"#!/usr/bin/env bash\necho yo".to_vec()),
        ("lib/share/thing.o".to_string(), b"some binary content".to_vec()),
    ])
}

#[test]
fn test_extract_gzipped_tar() {
    let archive = gzipped_tar(&[
        ("my-package/bin/executable", b"#!/usr/bin/env bash\necho yo", 0o755),
        ("my-package/lib/share/thing.o", b"some binary content", 0o644),
        ("my-package/README.md", b"# Details about this package", 0o644),
    ]);

    let dir = tempdir().unwrap();
    extract(archive.as_slice(), ArchiveFormat::TarGz, dir.path(), &ExtractOptions::new()).unwrap();

    assert!(dir.path().join("my-package/bin/executable").is_file());
    assert!(dir.path().join("my-package/lib/share/thing.o").is_file());
    assert!(dir.path().join("my-package/README.md").is_file());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let meta = fs::metadata(dir.path().join("my-package/bin/executable")).unwrap();
        assert_ne!(meta.permissions().mode() & 0o111, 0);
    }
}

#[test]
fn test_extract_strip_components() {
    let archive = gzipped_tar(&[
        ("my-package/bin/executable", b"#!/usr/bin/env bash\necho yo", 0o755),
        ("my-package/README.md", b"# Details about this package", 0o644),
    ]);

    let dir = tempdir().unwrap();
    extract(
        archive.as_slice(),
        ArchiveFormat::TarGz,
        dir.path(),
        &ExtractOptions::new().strip_components(1),
    )
    .unwrap();

    assert!(dir.path().join("bin/executable").is_file());
    assert!(dir.path().join("README.md").is_file());
    assert!(!dir.path().join("my-package").exists());
}

#[test]
fn test_compress_then_extract_plain_tar() {
    let src = tempdir().unwrap();
    let files = sample_files();
    write_tree(src.path(), &files);

    let bytes = compress(Vec::new(), ArchiveFormat::Tar, src.path(), &CompressOptions::new()).unwrap();

    let out = tempdir().unwrap();
    extract(bytes.as_slice(), ArchiveFormat::Tar, out.path(), &ExtractOptions::new()).unwrap();

    assert_eq!(read_tree(out.path()), files);
}

#[test]
fn test_prefix_then_strip_restores_layout() {
    let src = tempdir().unwrap();
    let files = sample_files();
    write_tree(src.path(), &files);

    let bytes = compress(
        Vec::new(),
        ArchiveFormat::TarGz,
        src.path(),
        &CompressOptions::new().prefix_components(["repo", "sub", "dir"]),
    )
    .unwrap();

    let prefixed = tempdir().unwrap();
    extract(bytes.as_slice(), ArchiveFormat::TarGz, prefixed.path(), &ExtractOptions::new()).unwrap();
    assert!(prefixed.path().join("repo/sub/dir/README.md").is_file());

    let stripped = tempdir().unwrap();
    extract(
        bytes.as_slice(),
        ArchiveFormat::TarGz,
        stripped.path(),
        &ExtractOptions::new().strip_components(3),
    )
    .unwrap();
    assert_eq!(read_tree(stripped.path()), files);
}

#[test]
fn test_path_traversal_is_rejected() {
    let root = tempdir().unwrap();
    let dest = root.path().join("a").join("b");
    fs::create_dir_all(&dest).unwrap();

    let archive = tar_with_raw_name("../../etc/passwd", b"root:x:0:0");
    let err = extract(archive.as_slice(), ArchiveFormat::Tar, &dest, &ExtractOptions::new()).unwrap_err();

    assert!(err.is_illegal_path(), "unexpected error: {err}");
    assert!(!root.path().join("etc").exists());
    assert!(fs::read_dir(&dest).unwrap().next().is_none());
}

#[test]
fn test_path_traversal_after_strip_is_rejected() {
    let root = tempdir().unwrap();
    let dest = root.path().join("out");
    fs::create_dir_all(&dest).unwrap();

    // the leading segment is stripped, leaving a name that walks upwards
    let archive = tar_with_raw_name("wrapper/../escape.txt", b"nope");
    let err = extract(
        archive.as_slice(),
        ArchiveFormat::Tar,
        &dest,
        &ExtractOptions::new().strip_components(1),
    )
    .unwrap_err();

    match err {
        ArchiveError::IllegalPath { path } => assert_eq!(path, "wrapper/../escape.txt"),
        other => panic!("Expected IllegalPath, got {other:?}"),
    }
    assert!(!root.path().join("escape.txt").exists());
}

#[test]
fn test_absolute_names_land_inside_destination() {
    let root = tempdir().unwrap();
    let dest = root.path().join("out");
    fs::create_dir_all(&dest).unwrap();

    let archive = tar_with_raw_name("/abs/file.txt", b"anchored");
    extract(archive.as_slice(), ArchiveFormat::Tar, &dest, &ExtractOptions::new()).unwrap();
    assert_eq!(fs::read(dest.join("abs/file.txt")).unwrap(), b"anchored");

    // stripping `top/` from `top//file.txt` leaves `/file.txt`
    let archive = tar_with_raw_name("top//file.txt", b"doubled");
    extract(
        archive.as_slice(),
        ArchiveFormat::Tar,
        &dest,
        &ExtractOptions::new().strip_components(1),
    )
    .unwrap();
    assert_eq!(fs::read(dest.join("file.txt")).unwrap(), b"doubled");

    let archive = tar_with_raw_name("/../escape.txt", b"nope");
    let err = extract(archive.as_slice(), ArchiveFormat::Tar, &dest, &ExtractOptions::new()).unwrap_err();
    assert!(err.is_illegal_path(), "unexpected error: {err}");
    assert!(!root.path().join("escape.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_not_followed() {
    use std::os::unix::fs::symlink;

    let outside = tempdir().unwrap();
    fs::write(outside.path().join("secret.txt"), b"not for publishing").unwrap();

    let src = tempdir().unwrap();
    write_tree(src.path(), &sample_files());
    symlink(outside.path(), src.path().join("docs")).unwrap();
    symlink(outside.path().join("secret.txt"), src.path().join("secret.txt")).unwrap();

    let bytes = compress(Vec::new(), ArchiveFormat::TarGz, src.path(), &CompressOptions::new()).unwrap();

    let out = tempdir().unwrap();
    extract(bytes.as_slice(), ArchiveFormat::TarGz, out.path(), &ExtractOptions::new()).unwrap();
    assert_eq!(read_tree(out.path()), sample_files());
}

#[cfg(unix)]
#[test]
fn test_symlink_loop_does_not_fail_compression() {
    use std::os::unix::fs::symlink;

    let src = tempdir().unwrap();
    write_tree(src.path(), &sample_files());
    symlink(".", src.path().join("loop")).unwrap();
    symlink(src.path().join("lib"), src.path().join("lib/share/back")).unwrap();

    let bytes = compress(Vec::new(), ArchiveFormat::Tar, src.path(), &CompressOptions::new()).unwrap();

    let out = tempdir().unwrap();
    extract(bytes.as_slice(), ArchiveFormat::Tar, out.path(), &ExtractOptions::new()).unwrap();
    assert_eq!(read_tree(out.path()), sample_files());
}

#[test]
fn test_invalid_gzip_stream() {
    let dir = tempdir().unwrap();
    let err = extract(
        &b"definitely not gzip"[..],
        ArchiveFormat::TarGz,
        dir.path(),
        &ExtractOptions::new(),
    )
    .unwrap_err();

    assert!(matches!(err, ArchiveError::Gzip(_)), "unexpected error: {err}");
}

#[test]
fn test_compress_into_file() {
    let src = tempdir().unwrap();
    write_tree(src.path(), &sample_files());

    let scratch = tempdir().unwrap();
    let path = scratch.path().join("out.tar.gz");
    let mut file = compress(
        fs::File::create(&path).unwrap(),
        ArchiveFormat::TarGz,
        src.path(),
        &CompressOptions::new(),
    )
    .unwrap();
    file.flush().unwrap();

    let out = tempdir().unwrap();
    extract(fs::File::open(&path).unwrap(), ArchiveFormat::TarGz, out.path(), &ExtractOptions::new()).unwrap();
    assert_eq!(read_tree(out.path()), sample_files());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_roundtrip_preserves_files(
        files in prop::collection::btree_map(
            "([a-z]{1,6}/){0,2}[a-z]{1,6}\\.txt",
            prop::collection::vec(any::<u8>(), 0..512),
            1..8,
        )
    ) {
        let src = tempdir().unwrap();
        write_tree(src.path(), &files);

        let bytes = compress(Vec::new(), ArchiveFormat::TarGz, src.path(), &CompressOptions::new()).unwrap();

        let out = tempdir().unwrap();
        extract(bytes.as_slice(), ArchiveFormat::TarGz, out.path(), &ExtractOptions::new()).unwrap();

        prop_assert_eq!(read_tree(out.path()), files);
    }
}
