//! Configuration management for the Schema Registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schemas.toml)
//! - Environment variables (ASL__*)
//!
//! ## Example config file (schemas.toml):
//! ```toml
//! [registry]
//! default_creator = "registry"
//! cache_enabled = true
//! cache_capacity = 1024
//!
//! [store]
//! backend = "file"
//! path = "./schema-store"
//! key_prefix = "asl:"
//!
//! [names]
//! max_length = 128
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the schema registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Persistence settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Subject and version name rules
    #[serde(default)]
    pub names: NameConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `created_by` for registrations that supply no metadata
    #[serde(default = "default_creator")]
    pub default_creator: String,

    /// Memoize expression parses and results
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Entries kept per evaluator cache before it is cleared
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Which store backs the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Root directory for the file backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Namespace for every storage key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Name validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameConfig {
    /// Regex that subject names and version labels must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

// Default value functions
fn default_creator() -> String {
    "registry".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./schema-store")
}

fn default_key_prefix() -> String {
    "asl:".to_string()
}

fn default_max_length() -> usize {
    crate::names::DEFAULT_MAX_LENGTH
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_creator: default_creator(),
            cache_enabled: true,
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: default_store_path(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for NameConfig {
    fn default() -> Self {
        Self {
            pattern: None,
            max_length: default_max_length(),
        }
    }
}

impl SchemaConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["schemas.toml", ".schemas.toml", "config/schemas.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "adaptive", "schemas") {
            let xdg_config = config_dir.config_dir().join("schemas.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (ASL__STORE__BACKEND=file)
        builder = builder.add_source(
            Environment::with_prefix("ASL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the file store path (resolves relative paths)
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.path)
        }
    }
}
