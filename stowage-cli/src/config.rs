//! Configuration management
//!
//! Handles loading and storing the CLI configuration.
//! Config directory: ~/.stowage/ (cross-platform)
//!
//! Config file format (~/.stowage/config.toml):
//! ```toml
//! [storage]
//! default_backend = "default"
//! temp_dir = "/tmp"
//!
//! [storage.backends]
//! default = "fs:/srv/stowage/files"
//! archive = "fs-readonly:/mnt/archive"
//!
//! [metadata]
//! path = "/home/me/.stowage/records"
//! page_size = 100
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use stowage_storage::StorageConfig;

/// Structure of ~/.stowage/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StowageConfig {
    /// Storage backends
    #[serde(default)]
    pub storage: StorageConfig,

    /// Record database settings
    #[serde(default)]
    pub metadata: MetadataSettings,
}

/// Record database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSettings {
    /// Path of the sled record database
    #[serde(default = "default_records_path")]
    pub path: PathBuf,

    /// Rows committed together by `storage-checksums`
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            path: default_records_path(),
            page_size: default_page_size(),
        }
    }
}

fn default_records_path() -> PathBuf {
    config_root().join("records")
}

fn default_page_size() -> usize {
    stowage_metadata::backfill::DEFAULT_PAGE_SIZE
}

impl StowageConfig {
    /// Add the `default` filesystem backend when no backend is configured
    pub fn with_fallback_backend(mut self) -> Self {
        if self.storage.backends.is_empty() {
            let files = config_root().join("files");
            self.storage
                .backends
                .insert("default".to_string(), format!("fs:{}", files.display()));
        }
        self
    }
}

/// The config directory path (~/.stowage/), not created
pub fn config_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stowage")
}

/// Get the config file path, honoring an explicit override
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => config_root().join("config.toml"),
    }
}

/// Load configuration from `path`.
///
/// A missing file yields the defaults. A file that exists but cannot be
/// read or parsed is an error.
pub fn load_config(path: &Path) -> Result<StowageConfig> {
    let config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str::<StowageConfig>(&content).with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else {
        StowageConfig::default()
    };
    Ok(config.with_fallback_backend())
}

/// Save configuration to `path`
pub fn save_config(path: &Path, config: &StowageConfig) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        _ => {}
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, content).context("Failed to write config file")?;
    Ok(())
}
