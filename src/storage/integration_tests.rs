//! BlobStore contract tests run against both backends.

use crate::error::ErrorKind;
use crate::storage::{BlobStore, Digest, DiskBackend, IndexStoreBackend, ObjectKind};
use rstest::rstest;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy)]
enum Backend {
    Disk,
    Index,
}

fn open_store(backend: Backend) -> (BlobStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = match backend {
        Backend::Disk => BlobStore::new(
            Arc::new(DiskBackend::new(temp_dir.path().to_path_buf())),
            16,
        ),
        Backend::Index => BlobStore::new(Arc::new(IndexStoreBackend::in_memory().unwrap()), 16),
    };
    (store, temp_dir)
}

#[rstest]
#[case::disk(Backend::Disk)]
#[case::index(Backend::Index)]
#[tokio::test]
async fn test_duplicate_put_is_success(#[case] backend: Backend) {
    let (store, _temp_dir) = open_store(backend);
    let content = b"syntax = \"proto3\";\npackage acme.v1;\n";
    let digest = Digest::from_content(content);

    store.put_blob(&digest, content).await.unwrap();
    store.put_blob(&digest, content).await.unwrap();

    assert_eq!(store.get_blob(&digest).await.unwrap(), content);
}

#[rstest]
#[case::disk(Backend::Disk)]
#[case::index(Backend::Index)]
#[tokio::test]
async fn test_missing_digest_is_not_found(#[case] backend: Backend) {
    let (store, _temp_dir) = open_store(backend);
    let err = store
        .get(ObjectKind::Manifest, &Digest::from_content(b"never stored"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[rstest]
#[case::disk(Backend::Disk)]
#[case::index(Backend::Index)]
#[tokio::test]
async fn test_concurrent_identical_writes(#[case] backend: Backend) {
    let (store, _temp_dir) = open_store(backend);
    let content = b"shared content".to_vec();
    let digest = Digest::from_content(&content);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let digest = digest.clone();
            let content = content.clone();
            tokio::spawn(async move { store.put_blob(&digest, &content).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.get_blob(&digest).await.unwrap(), content);
    assert!(store.verify(ObjectKind::Blob, &digest).await.unwrap());
}

#[tokio::test]
async fn test_disk_keeps_single_copy() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(DiskBackend::new(temp_dir.path().to_path_buf()));
    let store = BlobStore::new(backend.clone(), 4);
    let content = b"only once";

    let first = store.put_content(ObjectKind::Blob, content).await.unwrap();
    let second = store.put_content(ObjectKind::Blob, content).await.unwrap();
    assert_eq!(first, second);

    let shard_dir = backend
        .object_path(ObjectKind::Blob, &first)
        .parent()
        .unwrap()
        .to_path_buf();
    let files = std::fs::read_dir(shard_dir).unwrap().count();
    assert_eq!(files, 1);
}
