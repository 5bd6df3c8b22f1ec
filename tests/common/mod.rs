//! Shared fixture for integration tests: a temporary registry with a blob
//! store, a SQLite metadata store, and helpers that publish module snapshots
//! into both.

#![allow(dead_code)]

use async_trait::async_trait;
use module_registry::metadata::{ManifestRecord, MetadataStore};
use module_registry::settings::{StorageBackendKind, StorageSettings};
use module_registry::storage::ObjectKind;
use module_registry::{
    BlobStore, Commit, FileManifest, ModuleResolver, Repository, SqliteMetadataStore,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const HOST: &str = "registry.local";

pub type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Metadata store wrapper that records every repository lookup.
pub struct CountingMetadataStore {
    inner: SqliteMetadataStore,
    lookups: Mutex<Vec<String>>,
}

impl CountingMetadataStore {
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }

    pub fn reset(&self) {
        self.lookups.lock().clear();
    }
}

#[async_trait]
impl MetadataStore for CountingMetadataStore {
    async fn find_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> module_registry::Result<Option<Repository>> {
        self.lookups.lock().push(format!("{}/{}", owner, name));
        self.inner.find_repository(owner, name).await
    }

    async fn find_commit(
        &self,
        repository_id: &str,
        reference: &str,
    ) -> module_registry::Result<Option<Commit>> {
        self.inner.find_commit(repository_id, reference).await
    }

    async fn find_manifest_record(
        &self,
        commit_id: &str,
    ) -> module_registry::Result<Option<ManifestRecord>> {
        self.inner.find_manifest_record(commit_id).await
    }
}

/// A temporary registry
pub struct RegistryFixture {
    pub blob_store: BlobStore,
    pub sqlite: SqliteMetadataStore,
    pub metadata: Arc<CountingMetadataStore>,
    pub temp_dir: TempDir,
}

impl RegistryFixture {
    pub async fn new(backend: StorageBackendKind) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let settings = StorageSettings {
            backend,
            root: temp_dir.path().join("objects"),
            ..StorageSettings::default()
        };
        let blob_store = BlobStore::from_settings(&settings).await?;
        let sqlite = SqliteMetadataStore::new(&temp_dir.path().join("metadata.db"), 4).await?;
        let metadata = Arc::new(CountingMetadataStore {
            inner: sqlite.clone(),
            lookups: Mutex::new(Vec::new()),
        });

        Ok(Self {
            blob_store,
            sqlite,
            metadata,
            temp_dir,
        })
    }

    pub async fn disk() -> TestResult<Self> {
        Self::new(StorageBackendKind::Disk).await
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.temp_dir.path().join("objects")
    }

    pub fn resolver(&self) -> ModuleResolver {
        ModuleResolver::new(HOST, self.metadata.clone(), self.blob_store.clone())
    }

    async fn repository(&self, owner: &str, name: &str) -> TestResult<Repository> {
        match self.sqlite.find_repository(owner, name).await? {
            Some(repository) => Ok(repository),
            None => Ok(self.sqlite.create_repository(owner, name).await?),
        }
    }

    /// Store `files` as a snapshot of `owner/name` under commit `commit_name`.
    pub async fn publish_files(
        &self,
        owner: &str,
        name: &str,
        commit_name: &str,
        files: &[(&str, &str)],
    ) -> TestResult<Commit> {
        let repository = self.repository(owner, name).await?;

        let mut manifest = FileManifest::new();
        for (path, content) in files {
            let digest = self
                .blob_store
                .put_content(ObjectKind::Blob, content.as_bytes())
                .await?;
            manifest.push(*path, digest)?;
        }
        let manifest_digest = self
            .blob_store
            .put_content(ObjectKind::Manifest, &manifest.to_bytes())
            .await?;

        Ok(self
            .sqlite
            .insert_commit(&repository.id, commit_name, &manifest_digest)
            .await?)
    }

    /// Publish a module whose `buf.toml` declares `deps`.
    pub async fn publish_module(
        &self,
        owner: &str,
        name: &str,
        commit_name: &str,
        deps: &[&str],
    ) -> TestResult<Commit> {
        let deps: Vec<String> = deps.iter().map(|d| format!("\"{}\"", d)).collect();
        let config = format!(
            "version = \"v1\"\nname = \"{}/{}/{}\"\ndeps = [{}]\n",
            HOST,
            owner,
            name,
            deps.join(", ")
        );
        let proto = format!("syntax = \"proto3\";\npackage {}.{};\n", owner, name);
        let proto_path = format!("{}/{}.proto", owner, name);
        self.publish_files(
            owner,
            name,
            commit_name,
            &[("buf.toml", config.as_str()), (proto_path.as_str(), proto.as_str())],
        )
        .await
    }
}

pub fn reference(value: &str) -> module_registry::ModuleReference {
    module_registry::ModuleReference::parse(value).expect("valid reference")
}
