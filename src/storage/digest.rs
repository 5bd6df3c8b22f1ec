//! Content digests
//!
//! A digest is written as `<algorithm>:<hex>`. The registry itself only ever
//! produces `sha256` digests, but stored manifests are treated as opaque: any
//! algorithm name followed by a hex string parses.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Algorithm used by [`Digest::from_content`].
pub const SHA256: &str = "sha256";

/// Content-derived identifier of a blob or manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Compute the SHA-256 digest of `content`.
    ///
    /// # Example
    ///
    /// ```
    /// use module_registry::storage::Digest;
    ///
    /// let digest = Digest::from_content(b"");
    /// assert_eq!(
    ///     digest.to_string(),
    ///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    /// );
    /// ```
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self {
            algorithm: SHA256.to_string(),
            hex: format!("{:x}", hasher.finalize()),
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let (algorithm, hex) = value
            .split_once(':')
            .ok_or_else(|| RegistryError::decode_error(format!("malformed digest {:?}", value)))?;

        if algorithm.is_empty()
            || !algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(RegistryError::decode_error(format!(
                "malformed digest algorithm in {:?}",
                value
            )));
        }
        if hex.is_empty() || !hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(RegistryError::decode_error(format!(
                "malformed digest value in {:?}",
                value
            )));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Whether `content` hashes to this digest. Always false for algorithms
    /// the registry cannot compute.
    pub fn matches(&self, content: &[u8]) -> bool {
        self.algorithm == SHA256 && Self::from_content(content) == *self
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Digest::parse(&value).map_err(serde::de::Error::custom)
    }
}
