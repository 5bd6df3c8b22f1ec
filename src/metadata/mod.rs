//! Metadata store interface
//!
//! Repository, commit, and manifest records are owned by the metadata store;
//! the registry core only reads them. Lookups return `Ok(None)` for a
//! missing record, and any other failure is an error the caller surfaces as
//! internal.

pub mod sqlite;

pub use sqlite::SqliteMetadataStore;

use crate::error::Result;
use crate::storage::Digest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub owner: String,
    pub name: String,
}

/// One immutable version of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub name: String,
    pub repository_id: String,
}

/// Pointer from a commit to its stored file manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub commit_id: String,
    pub digest: Digest,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn find_repository(&self, owner: &str, name: &str) -> Result<Option<Repository>>;

    /// Find the commit `reference` points at in the repository. The reference
    /// may be a commit name, a tag, or the default branch.
    async fn find_commit(&self, repository_id: &str, reference: &str) -> Result<Option<Commit>>;

    async fn find_manifest_record(&self, commit_id: &str) -> Result<Option<ManifestRecord>>;
}
