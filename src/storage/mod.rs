//! Content-Addressable Storage Module
//!
//! Immutable blobs and manifests addressed by their digest, behind one
//! [`BlobStore`] handle with interchangeable backends:
//!
//! - [`DiskBackend`]: one file per object under a fixed root
//! - [`IndexStoreBackend`]: one document per object in a Tantivy index
//!
//! The backend is chosen once at startup from configuration; call sites only
//! see the [`BlobStore`] contract.

pub mod blob_store;
pub mod digest;
pub mod disk;
pub mod index_store;

#[cfg(test)]
mod integration_tests;

pub use blob_store::{BlobStore, DigestLocks, ObjectBackend, ObjectKind, DEFAULT_LOCK_SHARDS};
pub use digest::Digest;
pub use disk::DiskBackend;
pub use index_store::IndexStoreBackend;
