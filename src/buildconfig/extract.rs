//! Locating well-known files in a module snapshot
//!
//! The build config is strict: a snapshot needs exactly one recognized
//! config file, and two candidates are rejected rather than tie-broken.
//! Documentation and license files are optional; when several match, the
//! first in manifest order wins.

use crate::buildconfig::{BuildConfig, CONFIG_FILE_NAMES, DOCUMENTATION_FILE_NAMES, LICENSE_FILE_NAME};
use crate::error::{RegistryError, Result};
use crate::manifest::{Blob, BlobSet, FileManifest};
use crate::storage::Digest;
use tracing::debug;

/// A file picked out of a snapshot together with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    pub path: String,
    pub blob: Blob,
}

/// Find the single build-config file and decode it.
pub fn extract_config(manifest: &FileManifest, blob_set: &BlobSet) -> Result<BuildConfig> {
    let mut matches: Vec<(String, Digest)> = Vec::new();
    manifest.range(|path, digest| {
        if CONFIG_FILE_NAMES.contains(&path) {
            matches.push((path.to_string(), digest.clone()));
        }
        Ok(())
    })?;

    let (path, digest) = match matches.as_slice() {
        [] => {
            return Err(RegistryError::invalid_argument(format!(
                "no config file found, expected one of: {}",
                CONFIG_FILE_NAMES.join(", ")
            )))
        }
        [single] => single,
        [first, second, ..] => {
            return Err(RegistryError::invalid_argument(format!(
                "two config files found: {} and {}",
                first.0, second.0
            )))
        }
    };

    let blob = blob_for(blob_set, path, digest)?;
    debug!(path = %path, digest = %digest, "Decoding build config");
    BuildConfig::decode(path, &blob.content)
}

/// First recognized documentation file, if any.
pub fn extract_documentation(
    manifest: &FileManifest,
    blob_set: &BlobSet,
) -> Result<Option<ModuleFile>> {
    first_match(manifest, blob_set, |path| DOCUMENTATION_FILE_NAMES.contains(&path))
}

/// The license file, if any.
pub fn extract_license(manifest: &FileManifest, blob_set: &BlobSet) -> Result<Option<ModuleFile>> {
    first_match(manifest, blob_set, |path| path == LICENSE_FILE_NAME)
}

fn first_match<P>(
    manifest: &FileManifest,
    blob_set: &BlobSet,
    predicate: P,
) -> Result<Option<ModuleFile>>
where
    P: Fn(&str) -> bool,
{
    let mut found: Option<(String, Digest)> = None;
    manifest.range(|path, digest| {
        if found.is_none() && predicate(path) {
            found = Some((path.to_string(), digest.clone()));
        }
        Ok(())
    })?;

    found
        .map(|(path, digest)| {
            let blob = blob_for(blob_set, &path, &digest)?.clone();
            Ok(ModuleFile { path, blob })
        })
        .transpose()
}

fn blob_for<'a>(blob_set: &'a BlobSet, path: &str, digest: &Digest) -> Result<&'a Blob> {
    blob_set.blob_for(digest).ok_or_else(|| {
        RegistryError::internal(format!(
            "blob {} for {} is missing from the blob set",
            digest, path
        ))
    })
}
