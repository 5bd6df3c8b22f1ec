//! Module registry core
//!
//! Content-addressed storage for module snapshots and dependency closure
//! resolution over them:
//!
//! - [`storage`]: digests and the [`BlobStore`] with disk and index backends
//! - [`manifest`]: the ordered path-to-digest listing of a snapshot, and the
//!   blob set it materializes
//! - [`buildconfig`]: module references and the build-config file found in a
//!   snapshot
//! - [`metadata`]: repository and commit lookups
//! - [`resolver`]: direct and transitive resolution with conflict detection
//!
//! [`settings`] and [`telemetry`] wire these up for the `registry` binary.

pub mod buildconfig;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod resolver;
pub mod settings;
pub mod storage;
pub mod telemetry;

pub use buildconfig::{BuildConfig, ModuleIdentity, ModuleReference};
pub use error::{ErrorKind, RegistryError, Result};
pub use manifest::{Blob, BlobSet, FileManifest};
pub use metadata::{Commit, MetadataStore, Repository, SqliteMetadataStore};
pub use resolver::{DependencyPin, ModuleResolver, Resolution};
pub use settings::AppConfig;
pub use storage::{BlobStore, Digest};
