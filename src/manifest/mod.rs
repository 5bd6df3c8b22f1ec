//! File manifests
//!
//! A manifest is the ordered `(path, digest)` listing of one module
//! snapshot. On the wire it is UTF-8 text with one entry per line:
//!
//! ```text
//! sha256:3b1c...  acme/v1/ping.proto
//! sha256:9f04...  buf.toml
//! ```
//!
//! Digest and path are separated by exactly two spaces. Entry order is
//! preserved through parse and serialize.

pub mod blob_set;


pub use blob_set::{Blob, BlobSet};

use crate::error::{RegistryError, Result};
use crate::storage::Digest;
use std::collections::HashSet;

const SEPARATOR: &str = "  ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub digest: Digest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
    entries: Vec<ManifestEntry>,
    paths: HashSet<String>,
}

impl FileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Paths must be relative, normalized, and unique.
    pub fn push(&mut self, path: impl Into<String>, digest: Digest) -> Result<()> {
        let path = path.into();
        validate_path(&path)?;
        if !self.paths.insert(path.clone()) {
            return Err(RegistryError::decode_error(format!(
                "duplicate manifest path {:?}",
                path
            )));
        }
        self.entries.push(ManifestEntry { path, digest });
        Ok(())
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RegistryError::decode_error(format!("manifest is not UTF-8: {}", e)))?;

        let mut manifest = Self::new();
        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let (digest, path) = line.split_once(SEPARATOR).ok_or_else(|| {
                RegistryError::decode_error(format!(
                    "invalid manifest line {}: missing separator",
                    line_number
                ))
            })?;
            let digest = Digest::parse(digest)
                .map_err(|e| e.with_context(format!("manifest line {}", line_number)))?;
            manifest
                .push(path, digest)
                .map_err(|e| e.with_context(format!("manifest line {}", line_number)))?;
        }
        Ok(manifest)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.digest.to_string());
            out.push_str(SEPARATOR);
            out.push_str(&entry.path);
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Digest of the serialized manifest, the key it is stored under.
    pub fn digest(&self) -> Digest {
        Digest::from_content(&self.to_bytes())
    }

    /// Call `visitor` once per entry in manifest order, stopping at the
    /// first error it returns.
    pub fn range<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&str, &Digest) -> Result<()>,
    {
        for entry in &self.entries {
            visitor(&entry.path, &entry.digest)?;
        }
        Ok(())
    }

    pub fn digest_for(&self, path: &str) -> Option<&Digest> {
        self.entries
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| &entry.digest)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(RegistryError::decode_error("empty manifest path"));
    }
    if path.contains('\n') || path.contains('\r') || path.contains('\\') {
        return Err(RegistryError::decode_error(format!(
            "invalid character in manifest path {:?}",
            path
        )));
    }
    let normalized = path
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if !normalized {
        return Err(RegistryError::decode_error(format!(
            "manifest path {:?} must be relative and normalized",
            path
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn digest(content: &str) -> Digest {
        Digest::from_content(content.as_bytes())
    }

    #[test]
    fn test_parse_preserves_order() {
        let a = digest("a");
        let b = digest("b");
        let text = format!("{}  z/last.proto\n{}  a/first.proto\n", a, b);

        let manifest = FileManifest::parse(text.as_bytes()).unwrap();
        let paths: Vec<_> = manifest.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["z/last.proto", "a/first.proto"]);
        assert_eq!(manifest.to_bytes(), text.as_bytes());
    }

    #[test]
    fn test_path_with_spaces() {
        let text = format!("{}  docs/read me.md\n", digest("x"));
        let manifest = FileManifest::parse(text.as_bytes()).unwrap();
        assert_eq!(manifest.entries()[0].path, "docs/read me.md");
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = FileManifest::parse(b"").unwrap();
        assert!(manifest.is_empty());
        assert!(manifest.to_bytes().is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        let d = digest("x");
        let cases = [
            "no separator here\n".to_string(),
            "sha256:zz  a.proto\n".to_string(),
            format!("{}  /abs.proto\n", d),
            format!("{}  ../escape.proto\n", d),
            format!("{}  a/./b.proto\n", d),
            format!("{}  \n", d),
            format!("{}  a.proto\n{}  a.proto\n", d, d),
        ];
        for case in cases {
            let err = FileManifest::parse(case.as_bytes()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Internal, "{:?}", case);
        }
    }

    #[test]
    fn test_range_visits_in_order() {
        let mut manifest = FileManifest::new();
        manifest.push("b.proto", digest("b")).unwrap();
        manifest.push("a.proto", digest("a")).unwrap();

        let mut seen = Vec::new();
        manifest
            .range(|path, _| {
                seen.push(path.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["b.proto", "a.proto"]);
    }

    #[test]
    fn test_range_stops_at_first_error() {
        let mut manifest = FileManifest::new();
        for name in ["one.proto", "two.proto", "three.proto"] {
            manifest.push(name, digest(name)).unwrap();
        }

        let mut visited = 0;
        let result = manifest.range(|path, _| {
            visited += 1;
            if path == "two.proto" {
                return Err(RegistryError::internal("stop"));
            }
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_shared_digest_for_identical_files() {
        let same = digest("identical");
        let mut manifest = FileManifest::new();
        manifest.push("a.proto", same.clone()).unwrap();
        manifest.push("b.proto", same.clone()).unwrap();

        assert_eq!(manifest.digest_for("a.proto"), Some(&same));
        assert_eq!(manifest.digest_for("b.proto"), Some(&same));
        assert_eq!(manifest.digest_for("c.proto"), None);
    }

    #[test]
    fn test_manifest_digest_depends_on_order() {
        let mut first = FileManifest::new();
        first.push("a.proto", digest("a")).unwrap();
        first.push("b.proto", digest("b")).unwrap();

        let mut second = FileManifest::new();
        second.push("b.proto", digest("b")).unwrap();
        second.push("a.proto", digest("a")).unwrap();

        assert_ne!(first.digest(), second.digest());
    }
}
