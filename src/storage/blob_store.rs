//! Backend-agnostic content store
//!
//! [`BlobStore`] is the one handle the rest of the registry talks to. It owns
//! a backend (disk or index store, picked at startup) and a fixed-size table
//! of per-digest locks:
//!
//! - `put` takes the digest's shard exclusively, then asks the backend to
//!   create the object only if it is absent. An existing object is success.
//! - `get` takes the shard shared, so a reader never observes a half-written
//!   object produced by a writer in this process.
//!
//! Blobs and manifests share the same contract on separate namespaces
//! ([`ObjectKind`]).

use crate::error::{RegistryError, Result};
use crate::settings::{StorageBackendKind, StorageSettings};
use crate::storage::{Digest, DiskBackend, IndexStoreBackend};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Default number of lock shards.
pub const DEFAULT_LOCK_SHARDS: usize = 64;

/// Logical namespace an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Manifest,
}

impl ObjectKind {
    /// Collection / directory name for this namespace.
    pub fn collection(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blobs",
            ObjectKind::Manifest => "manifests",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Blob => f.write_str("blob"),
            ObjectKind::Manifest => f.write_str("manifest"),
        }
    }
}

/// Storage primitive a backend must provide.
#[async_trait]
pub trait ObjectBackend: Send + Sync + fmt::Debug {
    /// Store `content` under `digest` unless something is already stored there.
    ///
    /// Returns `true` when this call created the object and `false` when it
    /// already existed. The existing content is not compared.
    async fn create_if_absent(&self, kind: ObjectKind, digest: &Digest, content: &[u8])
        -> Result<bool>;

    /// Read the object stored under `digest`, `None` when absent.
    async fn read(&self, kind: ObjectKind, digest: &Digest) -> Result<Option<Vec<u8>>>;

    fn name(&self) -> &'static str;
}

/// Fixed-size table of read/write locks keyed by digest hash.
///
/// Two digests may share a shard; that only costs some parallelism.
#[derive(Debug)]
pub struct DigestLocks {
    shards: Box<[RwLock<()>]>,
}

impl DigestLocks {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| RwLock::new(())).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_index(&self, kind: ObjectKind, digest: &Digest) -> usize {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        digest.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    pub async fn write(&self, kind: ObjectKind, digest: &Digest) -> RwLockWriteGuard<'_, ()> {
        self.shards[self.shard_index(kind, digest)].write().await
    }

    pub async fn read(&self, kind: ObjectKind, digest: &Digest) -> RwLockReadGuard<'_, ()> {
        self.shards[self.shard_index(kind, digest)].read().await
    }
}

/// Content-addressed get/put over a pluggable backend.
///
/// Cheap to clone; clones share the backend and the lock table.
#[derive(Debug, Clone)]
pub struct BlobStore {
    backend: Arc<dyn ObjectBackend>,
    locks: Arc<DigestLocks>,
}

impl BlobStore {
    pub fn new(backend: Arc<dyn ObjectBackend>, lock_shards: usize) -> Self {
        Self {
            backend,
            locks: Arc::new(DigestLocks::new(lock_shards)),
        }
    }

    /// Build the store selected by configuration. Called once at startup.
    pub async fn from_settings(settings: &StorageSettings) -> Result<Self> {
        let backend: Arc<dyn ObjectBackend> = match settings.backend {
            StorageBackendKind::Disk => Arc::new(DiskBackend::new(settings.root.clone())),
            StorageBackendKind::Index => Arc::new(IndexStoreBackend::open(
                &settings.root,
                settings.writer_heap_size,
            )?),
        };

        info!(
            backend = backend.name(),
            root = %settings.root.display(),
            lock_shards = settings.lock_shards,
            "Blob store initialized"
        );

        Ok(Self::new(backend, settings.lock_shards))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Store `content` under `digest`. Writing an existing digest is a no-op.
    pub async fn put(&self, kind: ObjectKind, digest: &Digest, content: &[u8]) -> Result<()> {
        let _guard = self.locks.write(kind, digest).await;

        let created = self.backend.create_if_absent(kind, digest, content).await?;
        if created {
            debug!(
                kind = %kind,
                digest = %digest,
                size = content.len(),
                "Stored object"
            );
        } else {
            debug!(
                kind = %kind,
                digest = %digest,
                "Object already exists, skipping write (existing content not compared)"
            );
        }
        Ok(())
    }

    /// Fetch the content stored under `digest`; `NotFound` when absent.
    pub async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>> {
        let _guard = self.locks.read(kind, digest).await;

        self.backend
            .read(kind, digest)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("{} {}", kind, digest)))
    }

    /// Compute the SHA-256 digest of `content`, store it, and return the digest.
    pub async fn put_content(&self, kind: ObjectKind, content: &[u8]) -> Result<Digest> {
        let digest = Digest::from_content(content);
        self.put(kind, &digest, content).await?;
        Ok(digest)
    }

    pub async fn put_blob(&self, digest: &Digest, content: &[u8]) -> Result<()> {
        self.put(ObjectKind::Blob, digest, content).await
    }

    pub async fn get_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        self.get(ObjectKind::Blob, digest).await
    }

    pub async fn put_manifest(&self, digest: &Digest, content: &[u8]) -> Result<()> {
        self.put(ObjectKind::Manifest, digest, content).await
    }

    pub async fn get_manifest(&self, digest: &Digest) -> Result<Vec<u8>> {
        self.get(ObjectKind::Manifest, digest).await
    }

    /// Re-hash the stored object and compare it with its digest.
    pub async fn verify(&self, kind: ObjectKind, digest: &Digest) -> Result<bool> {
        let content = self.get(kind, digest).await?;
        let valid = digest.matches(&content);
        if !valid {
            warn!(kind = %kind, digest = %digest, "Stored object does not match its digest");
        }
        Ok(valid)
    }
}
