//! Layered configuration
//!
//! Sources, lowest priority first:
//! 1. built-in defaults ([`AppConfig::default`])
//! 2. an optional TOML or JSON file
//! 3. `REGISTRY__<SECTION>__<KEY>` environment variables
//!
//! The merged result is validated before anything is constructed from it.

use crate::error::{RegistryError, Result};
use crate::storage::index_store::MIN_WRITER_HEAP_SIZE;
use crate::storage::DEFAULT_LOCK_SHARDS;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;
use validator::{Validate, ValidationError};

const ENV_PREFIX: &str = "REGISTRY";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(nested)]
    pub registry: RegistrySettings,

    #[validate(nested)]
    pub storage: StorageSettings,

    #[validate(nested)]
    pub metadata: MetadataSettings,

    #[validate(nested)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RegistrySettings {
    /// Remote name of this registry. References to other hosts are not
    /// resolved locally.
    #[validate(length(min = 1, max = 253))]
    pub host: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Disk,
    Index,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackendKind,

    /// Disk root, or the index directory for the index backend.
    pub root: PathBuf,

    #[validate(range(min = MIN_WRITER_HEAP_SIZE))]
    pub writer_heap_size: usize,

    #[validate(range(min = 1, max = 4096))]
    pub lock_shards: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetadataSettings {
    pub database_path: PathBuf,

    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingSettings {
    #[validate(custom(function = "validate_level"))]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,

    /// Also write daily-rotated log files here.
    pub directory: Option<PathBuf>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            host: "registry.local".to_string(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Disk,
            root: PathBuf::from("./data/objects"),
            writer_heap_size: 50_000_000,
            lock_shards: DEFAULT_LOCK_SHARDS,
        }
    }
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/metadata.db"),
            max_connections: 10,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

fn validate_level(level: &str) -> std::result::Result<(), ValidationError> {
    level
        .parse::<Level>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("unknown_log_level"))
}

impl AppConfig {
    /// Load defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
    }

    fn load_with_env(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(RegistryError::Config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: AppConfig = builder
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate().map_err(|e| {
            RegistryError::Config(format!("configuration validation failed: {}", e))
        })?;
        Ok(config)
    }
}
