//! Dependency closure resolution
//!
//! [`ModuleResolver`] turns a list of module references into one commit per
//! module identity. Transitive resolution walks each commit's own build
//! config depth-first, in input order.
//!
//! ## Conflicts and cycles
//!
//! The conflict key is the identity `(owner, repository)`, not the version:
//! two different commits for one identity anywhere in the closure fail the
//! whole resolution. A commit is recorded before its dependencies are
//! walked, so meeting the same identity again (a cycle, or a diamond that
//! agrees on the version) stops there.
//!
//! ## Cancellation
//!
//! The walk does not poll a cancellation signal. It is a plain future:
//! dropping it (for example through `tokio::time::timeout`) abandons the
//! walk at the next store lookup.

pub mod resolution;

pub use resolution::{DependencyPin, Resolution};

use crate::buildconfig::{extract_config, BuildConfig, ModuleReference};
use crate::error::{RegistryError, Result};
use crate::manifest::{BlobSet, FileManifest};
use crate::metadata::{Commit, MetadataStore};
use crate::storage::BlobStore;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Resolves references against the local registry.
#[derive(Clone)]
pub struct ModuleResolver {
    host: String,
    metadata: Arc<dyn MetadataStore>,
    blob_store: BlobStore,
}

impl std::fmt::Debug for ModuleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleResolver")
            .field("host", &self.host)
            .field("blob_store", &self.blob_store)
            .finish_non_exhaustive()
    }
}

impl ModuleResolver {
    /// `host` is this registry's remote name; references naming any other
    /// host are left to that registry and skipped.
    pub fn new(
        host: impl Into<String>,
        metadata: Arc<dyn MetadataStore>,
        blob_store: BlobStore,
    ) -> Self {
        Self {
            host: host.into(),
            metadata,
            blob_store,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Resolve the dependencies declared by `config`.
    pub async fn resolve_from_build_config(
        &self,
        config: &BuildConfig,
        transitive: bool,
    ) -> Result<Resolution> {
        self.resolve_from_references(config.dependency_references(), transitive)
            .await
    }

    /// Resolve `references`, and with `transitive` their whole closure.
    pub async fn resolve_from_references(
        &self,
        references: &[ModuleReference],
        transitive: bool,
    ) -> Result<Resolution> {
        let started = Instant::now();
        let mut resolved = Resolution::default();

        // Each frame is the unvisited tail of one dependency list; the top
        // frame belongs to the most recently recorded commit.
        let mut stack: Vec<std::vec::IntoIter<ModuleReference>> =
            vec![references.to_vec().into_iter()];

        while let Some(frame) = stack.last_mut() {
            let Some(reference) = frame.next() else {
                stack.pop();
                continue;
            };

            if reference.remote != self.host {
                debug!(reference = %reference, "Skipping reference to foreign host");
                continue;
            }

            let commit = self.find_commit(&reference).await?;
            let identity = reference.identity();

            match resolved.entry(identity.clone()) {
                Entry::Occupied(existing) => {
                    if existing.get().name != commit.name {
                        warn!(
                            identity = %identity,
                            existing = %existing.get().name,
                            requested = %commit.name,
                            "Version conflict in dependency closure"
                        );
                        return Err(RegistryError::internal(format!(
                            "two different versions {} and {} for {}",
                            existing.get().name,
                            commit.name,
                            identity
                        )));
                    }
                    debug!(identity = %identity, commit = %commit.name, "Already resolved");
                }
                Entry::Vacant(slot) => {
                    debug!(
                        identity = %identity,
                        commit = %commit.name,
                        depth = stack.len(),
                        "Resolved reference"
                    );
                    let commit_id = commit.id.clone();
                    slot.insert(commit);

                    if transitive {
                        let config = self.build_config_for_commit(&commit_id).await?;
                        stack.push(config.dependencies.into_iter());
                    }
                }
            }
        }

        info!(
            requested = references.len(),
            resolved = resolved.len(),
            transitive,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dependency resolution finished"
        );
        Ok(resolved)
    }

    /// Rebuild the build config stored with a commit: manifest record,
    /// manifest bytes, blob set, config extraction.
    pub async fn build_config_for_commit(&self, commit_id: &str) -> Result<BuildConfig> {
        let record = self
            .metadata
            .find_manifest_record(commit_id)
            .await?
            .ok_or_else(|| {
                RegistryError::not_found(format!("manifest for commit {}", commit_id))
            })?;

        let bytes = self
            .blob_store
            .get_manifest(&record.digest)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    RegistryError::internal(format!(
                        "commit {} references missing manifest {}",
                        commit_id, record.digest
                    ))
                } else {
                    e
                }
            })?;

        let manifest = FileManifest::parse(&bytes)
            .map_err(|e| e.with_context(format!("manifest {}", record.digest)))?;
        let blob_set = BlobSet::build(&manifest, &self.blob_store).await?;
        extract_config(&manifest, &blob_set)
            .map_err(|e| e.with_context(format!("commit {}", commit_id)))
    }

    async fn find_commit(&self, reference: &ModuleReference) -> Result<Commit> {
        let identity = reference.identity();

        let repository = self
            .metadata
            .find_repository(&identity.owner, &identity.repository)
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("repository {}", identity)))?;

        self.metadata
            .find_commit(&repository.id, &reference.reference)
            .await?
            .ok_or_else(|| {
                RegistryError::not_found(format!("commit {}:{}", identity, reference.reference))
            })
    }
}
