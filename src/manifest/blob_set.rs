//! Materialized blobs for one manifest.

use crate::error::{RegistryError, Result};
use crate::manifest::FileManifest;
use crate::storage::{BlobStore, Digest};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, error};

/// Immutable content plus the digest it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub digest: Digest,
    pub content: Bytes,
}

impl Blob {
    pub fn new(digest: Digest, content: impl Into<Bytes>) -> Self {
        Self {
            digest,
            content: content.into(),
        }
    }
}

/// Blobs keyed by digest string, scoped to one manifest.
#[derive(Debug, Clone, Default)]
pub struct BlobSet {
    blobs: HashMap<String, Blob>,
}

impl BlobSet {
    /// Fetch every blob the manifest references.
    ///
    /// A referenced digest missing from the store means the storage layer is
    /// corrupt, so the failure is `Internal` and names both the digest and
    /// the path, never `NotFound`.
    pub async fn build(manifest: &FileManifest, store: &BlobStore) -> Result<Self> {
        let mut blobs = HashMap::with_capacity(manifest.len());

        for entry in manifest.entries() {
            let key = entry.digest.to_string();
            if blobs.contains_key(&key) {
                continue;
            }

            let content = store.get_blob(&entry.digest).await.map_err(|e| {
                if e.is_not_found() {
                    error!(
                        digest = %entry.digest,
                        path = %entry.path,
                        "Manifest references a blob missing from storage"
                    );
                    RegistryError::internal(format!(
                        "manifest references missing blob {} for path {}",
                        entry.digest, entry.path
                    ))
                } else {
                    e
                }
            })?;
            blobs.insert(key, Blob::new(entry.digest.clone(), content));
        }

        debug!(
            files = manifest.len(),
            blobs = blobs.len(),
            "Built blob set"
        );
        Ok(Self { blobs })
    }

    pub fn from_blobs(blobs: impl IntoIterator<Item = Blob>) -> Self {
        Self {
            blobs: blobs
                .into_iter()
                .map(|blob| (blob.digest.to_string(), blob))
                .collect(),
        }
    }

    pub fn blob_for(&self, digest: &Digest) -> Option<&Blob> {
        self.blobs.get(&digest.to_string())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::DiskBackend;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn disk_store(temp_dir: &TempDir) -> BlobStore {
        BlobStore::new(
            Arc::new(DiskBackend::new(temp_dir.path().to_path_buf())),
            8,
        )
    }

    #[tokio::test]
    async fn test_build_collects_every_blob() {
        let temp_dir = TempDir::new().unwrap();
        let store = disk_store(&temp_dir);

        let mut manifest = FileManifest::new();
        for (path, content) in [("a.proto", "message A {}"), ("b.proto", "message B {}")] {
            let digest = Digest::from_content(content.as_bytes());
            store.put_blob(&digest, content.as_bytes()).await.unwrap();
            manifest.push(path, digest).unwrap();
        }

        let set = BlobSet::build(&manifest, &store).await.unwrap();
        assert_eq!(set.len(), 2);
        let digest = manifest.digest_for("b.proto").unwrap();
        assert_eq!(&set.blob_for(digest).unwrap().content[..], b"message B {}");
    }

    #[tokio::test]
    async fn test_identical_files_share_one_blob() {
        let temp_dir = TempDir::new().unwrap();
        let store = disk_store(&temp_dir);
        let digest = Digest::from_content(b"same");
        store.put_blob(&digest, b"same").await.unwrap();

        let mut manifest = FileManifest::new();
        manifest.push("one.txt", digest.clone()).unwrap();
        manifest.push("two.txt", digest.clone()).unwrap();

        let set = BlobSet::build(&manifest, &store).await.unwrap();
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_blob_is_internal() {
        let temp_dir = TempDir::new().unwrap();
        let store = disk_store(&temp_dir);

        let present = Digest::from_content(b"present");
        store.put_blob(&present, b"present").await.unwrap();
        let missing = Digest::from_content(b"missing");

        let mut manifest = FileManifest::new();
        manifest.push("present.proto", present).unwrap();
        manifest.push("missing.proto", missing.clone()).unwrap();

        let err = BlobSet::build(&manifest, &store).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        let message = err.to_string();
        assert!(message.contains(&missing.to_string()));
        assert!(message.contains("missing.proto"));
    }

    #[test]
    fn test_blob_for_unknown_digest() {
        let set = BlobSet::from_blobs([Blob::new(Digest::from_content(b"x"), b"x".to_vec())]);
        assert!(set.blob_for(&Digest::from_content(b"y")).is_none());
    }
}
