//! CLI Commands

pub mod backends;
pub mod checksums;
pub mod objects;
pub mod records;

use crate::config::StowageConfig;
use anyhow::{Context as _, Result};
use stowage_metadata::SledRecordStore;
use stowage_storage::BackendRegistry;

/// State shared by all commands
pub struct AppContext {
    pub config: StowageConfig,
}

impl AppContext {
    pub fn new(config: StowageConfig) -> Self {
        Self { config }
    }

    /// Build and validate the backend registry
    pub fn registry(&self) -> Result<BackendRegistry> {
        let registry = BackendRegistry::new(&self.config.storage).context("Invalid storage configuration")?;
        registry.validate().context("Invalid storage configuration")?;
        Ok(registry)
    }

    /// Open the record database
    pub fn records(&self) -> Result<SledRecordStore> {
        SledRecordStore::open(&self.config.metadata.path).with_context(|| {
            format!(
                "Failed to open record database at {}",
                self.config.metadata.path.display()
            )
        })
    }

    /// Backend named on the command line, or the configured default
    pub fn backend_name<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit.unwrap_or(&self.config.storage.default_backend)
    }
}
