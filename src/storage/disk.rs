//! Filesystem backend
//!
//! Objects live under a fixed root, one file per digest:
//!
//! ```text
//! root/
//!   blobs/
//!     sha256/
//!       a3/
//!         f2e1d4c5b6a7...   (hex digest minus the first 2 chars)
//!   manifests/
//!     sha256/
//!       ...
//! ```
//!
//! The first 2 hex characters become a directory so no single directory
//! grows too large. Digests of 2 hex characters or fewer go to `_short/`,
//! which can never collide with a shard directory.
//!
//! A write stages the content in a hidden file next to its final path and
//! hard-links it into place, so the digest path only ever names a complete
//! object. An existing link target is success.

use crate::error::{RegistryError, Result};
use crate::storage::{Digest, ObjectBackend, ObjectKind};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

const SHORT_DIGEST_DIR: &str = "_short";
const STAGING_PREFIX: &str = ".staged-";

/// Disk-backed object storage.
#[derive(Debug, Clone)]
pub struct DiskBackend {
    root: PathBuf,
}

impl DiskBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Filesystem path for a digest.
    ///
    /// # Example
    ///
    /// ```
    /// # use module_registry::storage::{Digest, DiskBackend, ObjectKind};
    /// # use std::path::PathBuf;
    /// let backend = DiskBackend::new(PathBuf::from("/srv/registry"));
    /// let digest = Digest::parse("sha256:a3f2e1").unwrap();
    /// let path = backend.object_path(ObjectKind::Blob, &digest);
    /// assert_eq!(path, PathBuf::from("/srv/registry/blobs/sha256/a3/f2e1"));
    /// ```
    pub fn object_path(&self, kind: ObjectKind, digest: &Digest) -> PathBuf {
        let hex = digest.hex();
        let (directory, file_name) = if hex.len() > 2 {
            hex.split_at(2)
        } else {
            (SHORT_DIGEST_DIR, hex)
        };

        self.root
            .join(kind.collection())
            .join(digest.algorithm())
            .join(directory)
            .join(file_name)
    }

    /// Write `content` to a fresh staging file in `directory`. The staging
    /// file is removed again when any step fails.
    async fn stage(&self, directory: &Path, content: &[u8]) -> Result<PathBuf> {
        let staged = directory.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .await
            .map_err(|e| {
                RegistryError::io_error(
                    format!("Failed to create staging file: {}", e),
                    Some(staged.clone()),
                )
            })?;

        let written = match write_staged(&mut file, content).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        drop(file);

        if let Err(e) = written {
            discard(&staged).await;
            return Err(RegistryError::io_error(
                format!("Failed to write object file: {}", e),
                Some(staged),
            ));
        }
        Ok(staged)
    }
}

async fn write_staged<W>(writer: &mut W, content: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(content).await?;
    writer.flush().await
}

async fn discard(staged: &Path) {
    if let Err(e) = fs::remove_file(staged).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %staged.display(), error = %e, "Failed to remove staging file");
        }
    }
}

#[async_trait]
impl ObjectBackend for DiskBackend {
    async fn create_if_absent(
        &self,
        kind: ObjectKind,
        digest: &Digest,
        content: &[u8],
    ) -> Result<bool> {
        let object_path = self.object_path(kind, digest);
        if fs::try_exists(&object_path).await.unwrap_or(false) {
            return Ok(false);
        }

        let directory = object_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&directory).await.map_err(|e| {
            RegistryError::io_error(
                format!("Failed to create object directory: {}", e),
                Some(directory.clone()),
            )
        })?;

        let staged = self.stage(&directory, content).await?;

        // link fails with AlreadyExists if another writer got there first
        let linked = fs::hard_link(&staged, &object_path).await;
        discard(&staged).await;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(
                    digest = %digest,
                    path = %object_path.display(),
                    "Object file already exists"
                );
                Ok(false)
            }
            Err(e) => Err(RegistryError::io_error(
                format!("Failed to install object file: {}", e),
                Some(object_path),
            )),
        }
    }

    async fn read(&self, kind: ObjectKind, digest: &Digest) -> Result<Option<Vec<u8>>> {
        let object_path = self.object_path(kind, digest);

        match fs::read(&object_path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::io_error(
                format!("Failed to read {} {}: {}", kind, digest, e),
                Some(object_path),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}
