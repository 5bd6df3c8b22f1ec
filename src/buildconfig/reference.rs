//! Module names, references, and identities
//!
//! A dependency is written `remote/owner/repository[:reference]`. The
//! reference is a commit name, a tag, or a branch; when omitted it is the
//! default branch. The remote may carry a port (`localhost:8080`).

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Reference used when a dependency names no version.
pub const DEFAULT_REFERENCE: &str = "main";

/// `(owner, repository)`: the key a resolution allows one version for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub owner: String,
    pub repository: String,
}

impl ModuleIdentity {
    pub fn new(owner: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repository)
    }
}

/// `remote/owner/repository`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleName {
    pub remote: String,
    pub owner: String,
    pub repository: String,
}

impl ModuleName {
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('/').collect();
        let [remote, owner, repository] = parts.as_slice() else {
            return Err(RegistryError::decode_error(format!(
                "module name {:?} must have the form remote/owner/repository",
                value
            )));
        };
        validate_remote(remote, value)?;
        for (label, part) in [("owner", owner), ("repository", repository)] {
            validate_component(label, part, value)?;
        }
        Ok(Self {
            remote: remote.to_string(),
            owner: owner.to_string(),
            repository: repository.to_string(),
        })
    }

    pub fn identity(&self) -> ModuleIdentity {
        ModuleIdentity::new(self.owner.clone(), self.repository.clone())
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.remote, self.owner, self.repository)
    }
}

/// Pointer to one version of a module, possibly on another registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleReference {
    pub remote: String,
    pub owner: String,
    pub repository: String,
    pub reference: String,
}

impl ModuleReference {
    pub fn new(
        remote: impl Into<String>,
        owner: impl Into<String>,
        repository: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            remote: remote.into(),
            owner: owner.into(),
            repository: repository.into(),
            reference: reference.into(),
        }
    }

    /// Parse `remote/owner/repository[:reference]`.
    ///
    /// # Example
    ///
    /// ```
    /// use module_registry::buildconfig::ModuleReference;
    ///
    /// let reference = ModuleReference::parse("buf.example.com/acme/payments:v1.2.0").unwrap();
    /// assert_eq!(reference.identity().to_string(), "acme/payments");
    /// assert_eq!(reference.reference, "v1.2.0");
    ///
    /// let latest = ModuleReference::parse("buf.example.com/acme/payments").unwrap();
    /// assert_eq!(latest.reference, "main");
    /// ```
    pub fn parse(value: &str) -> Result<Self> {
        // the remote may carry a port, so only the last segment holds the reference
        let (name, reference) = match value.rsplit_once('/') {
            Some((head, last)) => match last.split_once(':') {
                Some((repository, reference)) => {
                    validate_component("reference", reference, value)?;
                    (&value[..head.len() + 1 + repository.len()], reference)
                }
                None => (value, DEFAULT_REFERENCE),
            },
            None => (value, DEFAULT_REFERENCE),
        };
        let name = ModuleName::parse(name)?;
        Ok(Self {
            remote: name.remote,
            owner: name.owner,
            repository: name.repository,
            reference: reference.to_string(),
        })
    }

    pub fn identity(&self) -> ModuleIdentity {
        ModuleIdentity::new(self.owner.clone(), self.repository.clone())
    }

    pub fn module_name(&self) -> ModuleName {
        ModuleName {
            remote: self.remote.clone(),
            owner: self.owner.clone(),
            repository: self.repository.clone(),
        }
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}",
            self.remote, self.owner, self.repository, self.reference
        )
    }
}

impl FromStr for ModuleReference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ModuleReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModuleReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        ModuleReference::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// A remote is a host, optionally with a port.
fn validate_remote(remote: &str, whole: &str) -> Result<()> {
    let (host, port) = match remote.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (remote, None),
    };
    let valid_port = port.map_or(true, |p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if !valid_port {
        return Err(RegistryError::decode_error(format!(
            "invalid remote port {:?} in {:?}",
            remote, whole
        )));
    }
    validate_component("remote", host, whole)
}

fn validate_component(label: &str, part: &str, whole: &str) -> Result<()> {
    if part.is_empty() || part.chars().any(|c| c.is_whitespace() || c == '/' || c == ':') {
        return Err(RegistryError::decode_error(format!(
            "invalid {} {:?} in {:?}",
            label, part, whole
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_reference() {
        let r = ModuleReference::parse("registry.local/acme/weather:3f2a9c").unwrap();
        assert_eq!(r.remote, "registry.local");
        assert_eq!(r.owner, "acme");
        assert_eq!(r.repository, "weather");
        assert_eq!(r.reference, "3f2a9c");
        assert_eq!(r.to_string(), "registry.local/acme/weather:3f2a9c");
    }

    #[test]
    fn test_parse_defaults_reference() {
        let r = ModuleReference::parse("registry.local/acme/weather").unwrap();
        assert_eq!(r.reference, DEFAULT_REFERENCE);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "acme/weather",
            "registry.local/acme/weather/extra",
            "registry.local//weather",
            "registry.local/acme/weather:",
            "registry.local/acme/wea ther",
            "registry.local/acme/weather:v1:v2",
        ] {
            assert!(ModuleReference::parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_parse_remote_with_port() {
        let r = ModuleReference::parse("localhost:8080/acme/weather:v1").unwrap();
        assert_eq!(r.remote, "localhost:8080");
        assert_eq!(r.owner, "acme");
        assert_eq!(r.repository, "weather");
        assert_eq!(r.reference, "v1");
        assert_eq!(r.to_string(), "localhost:8080/acme/weather:v1");

        let latest = ModuleReference::parse("localhost:8080/acme/weather").unwrap();
        assert_eq!(latest.remote, "localhost:8080");
        assert_eq!(latest.reference, DEFAULT_REFERENCE);

        let name = ModuleName::parse("10.0.0.5:443/acme/weather").unwrap();
        assert_eq!(name.remote, "10.0.0.5:443");
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        for bad in [
            "localhost:/acme/weather",
            "localhost:http/acme/weather:v1",
            ":8080/acme/weather",
            "localhost:80:80/acme/weather",
        ] {
            assert!(ModuleReference::parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_identity_ignores_remote_and_reference() {
        let a = ModuleReference::parse("one.host/acme/weather:v1").unwrap();
        let b = ModuleReference::parse("other.host/acme/weather:v2").unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity().to_string(), "acme/weather");
    }

    #[test]
    fn test_module_name_round_trip() {
        let name = ModuleName::parse("registry.local/acme/weather").unwrap();
        assert_eq!(name.to_string(), "registry.local/acme/weather");
        assert_eq!(name.identity(), ModuleIdentity::new("acme", "weather"));
    }
}
