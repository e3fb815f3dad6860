//! Stowage Storage Backends
//!
//! Provides the pluggable storage layer:
//! - `StorageBackend` trait for pluggable storage
//! - `FileSystemBackend` storing objects as files under a root directory
//! - `ReadOnly` decorator and `ReadOnlyFileSystemBackend` for read-only mounts
//! - `MemoryBackend` for testing
//! - `BackendRegistry` resolving configured `name:data` definitions

pub mod backend;
pub mod fs;
pub mod memory;
pub mod readonly;
pub mod registry;

pub use backend::{
    with_local_path, ContentDisposition, FileResponse, LocalPath, ObjectReader, SendFile, StorageBackend,
    StorageStats,
};
pub use fs::FileSystemBackend;
pub use memory::MemoryBackend;
pub use readonly::{ReadOnly, ReadOnlyFileSystemBackend};
pub use registry::{
    discover_backends, parse_backend_data, BackendContext, BackendData, BackendDescriptor, BackendProvider,
    BackendRegistry, BuiltinBackends,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend used for new uploads
    pub default_backend: String,

    /// Directory for temporary local copies
    pub temp_dir: PathBuf,

    /// Backend definitions in `name:data` notation, by backend name
    pub backends: BTreeMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_backend: "default".to_string(),
            temp_dir: std::env::temp_dir(),
            backends: BTreeMap::new(),
        }
    }
}

impl StorageConfig {
    /// Create an empty storage config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend definition
    pub fn with_backend(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.backends.insert(name.into(), definition.into());
        self
    }

    /// Set the backend used for new uploads
    pub fn with_default_backend(mut self, name: impl Into<String>) -> Self {
        self.default_backend = name.into();
        self
    }

    /// Set the directory for temporary local copies
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }
}
