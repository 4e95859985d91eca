//! Integration tests for storage routing

use std::sync::Arc;

use depot_registry::storage::{BlobStorage, FileStorage, MemoryStorage, StorageRouter};
use depot_registry::RegistryError;
use tempfile::tempdir;

#[tokio::test]
async fn test_nested_file_roots_route_to_most_specific() {
    let outer_dir = tempdir().unwrap();
    let inner_dir = tempdir().unwrap();

    let router = StorageRouter::new();
    router
        .register_storages([
            (
                "file:///tmp",
                Arc::new(FileStorage::new(outer_dir.path())) as Arc<dyn BlobStorage>,
            ),
            (
                "file:///tmp/sub",
                Arc::new(FileStorage::new(inner_dir.path())) as Arc<dyn BlobStorage>,
            ),
        ])
        .await;

    let mut src: &[u8] = b"routed";
    router.write("file:///tmp/sub/x", &mut src).await.unwrap();

    assert_eq!(std::fs::read(inner_dir.path().join("x")).unwrap(), b"routed");
    assert!(!outer_dir.path().join("sub/x").exists());

    let mut out = Vec::new();
    router.read("file:///tmp/sub/x", &mut out).await.unwrap();
    assert_eq!(out, b"routed");
}

#[tokio::test]
async fn test_unregistered_scheme_is_an_error() {
    let dir = tempdir().unwrap();
    let router = StorageRouter::new();
    router
        .register_backends(&[format!("file://{}", dir.path().display())])
        .await
        .unwrap();

    let mut out = Vec::new();
    let err = router.read("s3://bucket/key", &mut out).await.unwrap_err();
    match err {
        RegistryError::NoStorageForPath(uri) => assert_eq!(uri, "s3://bucket/key"),
        other => panic!("expected NoStorageForPath, got {other:?}"),
    }

    let mut src: &[u8] = b"x";
    assert!(matches!(
        router.write("wasistdas://nothing", &mut src).await,
        Err(RegistryError::NoStorageForPath(_))
    ));
}

#[tokio::test]
async fn test_file_and_memory_backends() {
    let dir = tempdir().unwrap();
    let file_root = format!("file://{}/artifacts?create_dir=1", dir.path().display());

    let router = StorageRouter::new();
    router
        .register_backends(&[file_root.as_str(), "mem://testing"])
        .await
        .unwrap();

    let file_uri = format!("file://{}/artifacts/sub/dir/file.txt", dir.path().display());
    for uri in [file_uri.as_str(), "mem://testing/sub/dir/file.txt"] {
        let mut src: &[u8] = b"sub dir content";
        let written = router.write(uri, &mut src).await.unwrap();
        assert_eq!(written, 15);

        let mut out = Vec::new();
        router.read(uri, &mut out).await.unwrap();
        assert_eq!(out, b"sub dir content", "{uri}");
        assert!(router.exists(uri).await.unwrap());
    }

    assert!(dir.path().join("artifacts/sub/dir/file.txt").is_file());

    router.delete(&file_uri).await.unwrap();
    assert!(!dir.path().join("artifacts/sub/dir/file.txt").exists());
}

#[tokio::test]
async fn test_missing_object_reports_uri() {
    let router = StorageRouter::new();
    router.register_backends(&["mem://testing"]).await.unwrap();

    let mut out = Vec::new();
    let err = router.read("mem://testing/missing.txt", &mut out).await.unwrap_err();
    assert!(matches!(err, RegistryError::Storage { ref uri, .. } if uri == "mem://testing/missing.txt"));
}

#[tokio::test]
async fn test_registration_is_all_or_nothing() {
    let dir = tempdir().unwrap();
    let router = StorageRouter::new();
    router.register_backends(&["mem://first"]).await.unwrap();

    // the second root does not exist and may not be created
    let roots = [
        "mem://second".to_string(),
        format!("file://{}/missing", dir.path().display()),
    ];
    let err = router.register_backends(&roots).await.unwrap_err();
    assert!(matches!(err, RegistryError::OpenStorage { .. }));
    assert!(err.to_string().starts_with("failed to construct storage for: file://"));

    assert_eq!(router.roots().await, vec!["mem://first".to_string()]);

    let mut src: &[u8] = b"still here";
    router.write("mem://first/a", &mut src).await.unwrap();
    let mut src: &[u8] = b"never";
    assert!(router.write("mem://second/a", &mut src).await.is_err());
}

#[tokio::test]
async fn test_concurrent_writes_and_reregistration() {
    let backend = Arc::new(MemoryStorage::new());
    let router = Arc::new(StorageRouter::new());
    router
        .register_storages([("mem://shared", backend.clone() as Arc<dyn BlobStorage>)])
        .await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let data = format!("object {i}");
            let mut src = data.as_bytes();
            router.write(&format!("mem://shared/{i}"), &mut src).await
        }));
    }
    // swapping in the same backend while writes are in flight never loses one
    router
        .register_storages([("mem://shared", backend.clone() as Arc<dyn BlobStorage>)])
        .await;

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(backend.len(), 16);
}
