//! Build configuration
//!
//! Every module snapshot carries exactly one build-config file at its root.
//! The decoded form is the module's name and its ordered dependency list:
//!
//! ```toml
//! version = "v1"
//! name = "registry.local/acme/payments"
//! deps = [
//!     "registry.local/acme/money:v2",
//!     "registry.local/googleapis/googleapis",
//! ]
//! ```
//!
//! The same shape is accepted as JSON in `buf.json`.

pub mod extract;
pub mod reference;

pub use extract::{extract_config, extract_documentation, extract_license, ModuleFile};
pub use reference::{ModuleIdentity, ModuleName, ModuleReference, DEFAULT_REFERENCE};

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};

/// Recognized build-config file names.
pub const CONFIG_FILE_NAMES: &[&str] = &["buf.toml", "buf.json"];

/// Recognized documentation file names, in no particular priority.
pub const DOCUMENTATION_FILE_NAMES: &[&str] = &["buf.md", "README.md", "README.markdown"];

pub const LICENSE_FILE_NAME: &str = "LICENSE";

const SUPPORTED_VERSIONS: &[&str] = &["v1beta1", "v1"];

/// On-disk document shape.
#[derive(Debug, Deserialize)]
struct ConfigDocument {
    version: Option<String>,
    name: Option<String>,
    #[serde(default)]
    deps: Vec<String>,
}

/// Decoded build config of one module snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildConfig {
    #[serde(serialize_with = "serialize_name")]
    pub name: Option<ModuleName>,
    pub dependencies: Vec<ModuleReference>,
}

fn serialize_name<S: serde::Serializer>(
    name: &Option<ModuleName>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match name {
        Some(name) => serializer.collect_str(name),
        None => serializer.serialize_none(),
    }
}

impl BuildConfig {
    pub fn new(name: Option<ModuleName>, dependencies: Vec<ModuleReference>) -> Self {
        Self { name, dependencies }
    }

    /// Decode the config file found at `path`; the format follows the
    /// file extension.
    pub fn decode(path: &str, content: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(content).map_err(|e| {
            RegistryError::decode_error(format!("config file {} is not UTF-8: {}", path, e))
        })?;

        let document: ConfigDocument = if path.ends_with(".json") {
            serde_json::from_str(text).map_err(|e| {
                RegistryError::decode_error(format!("failed to decode {}: {}", path, e))
            })?
        } else if path.ends_with(".toml") {
            toml::from_str(text).map_err(|e| {
                RegistryError::decode_error(format!("failed to decode {}: {}", path, e))
            })?
        } else {
            return Err(RegistryError::decode_error(format!(
                "unsupported config file format: {}",
                path
            )));
        };

        if let Some(version) = &document.version {
            if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
                return Err(RegistryError::decode_error(format!(
                    "unsupported config version {:?} in {}",
                    version, path
                )));
            }
        }

        let name = document
            .name
            .as_deref()
            .map(ModuleName::parse)
            .transpose()
            .map_err(|e| e.with_context(path.to_string()))?;
        let dependencies = document
            .deps
            .iter()
            .map(|dep| ModuleReference::parse(dep))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| e.with_context(path.to_string()))?;

        Ok(Self { name, dependencies })
    }

    pub fn dependency_references(&self) -> &[ModuleReference] {
        &self.dependencies
    }
}
