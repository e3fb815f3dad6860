//! Backend registry
//!
//! Maps configured backend names to live backend instances. Each
//! configuration entry uses the `name:data` notation, e.g.
//! `fs:/srv/files` or `memory:capacity=1048576`: `name` selects a backend
//! implementation, `data` initializes it.
//!
//! Implementations are contributed by `BackendProvider`s (the built-in set
//! plus any extension crates). Their names must be unique; this is checked
//! once, when the registry is built. Once a configured backend has been
//! resolved it is cached for the life of the registry.

use crate::backend::StorageBackend;
use crate::fs::FileSystemBackend;
use crate::memory::MemoryBackend;
use crate::readonly::ReadOnlyFileSystemBackend;
use crate::StorageConfig;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use stowage_core::error::ConfigError;
use tracing::{debug, info};

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Initialization data handed to a backend factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendData {
    /// The data string as-is (a path, a URL, ...)
    Simple(String),
    /// Parsed `key=value` pairs
    Pairs(BTreeMap<String, String>),
}

impl BackendData {
    /// The raw string of a simple-data backend
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BackendData::Simple(data) => Some(data),
            BackendData::Pairs(_) => None,
        }
    }

    /// Look up a key of a key/value backend
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            BackendData::Simple(_) => None,
            BackendData::Pairs(pairs) => pairs.get(key).map(String::as_str),
        }
    }
}

/// Parse a `key=value,key2=value2` data string.
///
/// Each segment is split on its first `=`; whitespace around keys and
/// values is trimmed. Empty input or a segment without `=` is an error.
pub fn parse_backend_data(data: &str) -> Result<BTreeMap<String, String>> {
    if data.trim().is_empty() {
        return Err(ConfigError::MalformedData("empty data string".to_string()));
    }

    data.split(',')
        .map(|item| {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedData(format!("expected key=value, got {:?}", item)))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Process-wide settings available to every backend factory
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Directory for temporary local copies
    pub temp_dir: PathBuf,
}

impl Default for BackendContext {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// Constructs a backend from its configuration data
pub type BackendFactory = fn(&BackendData, &BackendContext) -> Result<Arc<dyn StorageBackend>>;

/// A backend implementation known to the registry
#[derive(Clone, Copy)]
pub struct BackendDescriptor {
    /// Unique backend name used in `name:data` definitions
    pub name: &'static str,

    /// Whether the data string is passed as-is instead of parsed into pairs
    pub simple_data: bool,

    /// Factory creating instances
    pub factory: BackendFactory,
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("simple_data", &self.simple_data)
            .finish_non_exhaustive()
    }
}

/// Contributes backend implementations to the registry
pub trait BackendProvider {
    /// Name of the provider, for diagnostics
    fn name(&self) -> &str;

    /// Backend implementations offered by this provider
    fn backends(&self) -> Vec<BackendDescriptor>;
}

/// Backends shipped with this crate: `fs`, `fs-readonly` and `memory`
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackends;

impl BackendProvider for BuiltinBackends {
    fn name(&self) -> &str {
        "builtin"
    }

    fn backends(&self) -> Vec<BackendDescriptor> {
        vec![
            BackendDescriptor {
                name: FileSystemBackend::NAME,
                simple_data: true,
                factory: |data, _| Ok(Arc::new(FileSystemBackend::new(simple_path(data)?))),
            },
            BackendDescriptor {
                name: ReadOnlyFileSystemBackend::NAME,
                simple_data: true,
                factory: |data, _| Ok(Arc::new(ReadOnlyFileSystemBackend::filesystem(simple_path(data)?))),
            },
            BackendDescriptor {
                name: MemoryBackend::NAME,
                simple_data: false,
                factory: memory_factory,
            },
        ]
    }
}

fn simple_path(data: &BackendData) -> Result<PathBuf> {
    match data.as_str() {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(ConfigError::MalformedData("expected a directory path".to_string())),
    }
}

fn memory_factory(data: &BackendData, context: &BackendContext) -> Result<Arc<dyn StorageBackend>> {
    let capacity = match data.get("capacity") {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue("capacity".to_string(), value.to_string()))?,
        None => 0,
    };
    let temp_dir = data
        .get("temp_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| context.temp_dir.clone());

    Ok(Arc::new(MemoryBackend::with_capacity(capacity).with_temp_dir(temp_dir)))
}

/// Collect the implementations of all providers, rejecting duplicate names
pub fn discover_backends(providers: &[&dyn BackendProvider]) -> Result<BTreeMap<&'static str, BackendDescriptor>> {
    let mut backends = BTreeMap::new();
    for provider in providers {
        for descriptor in provider.backends() {
            if backends.insert(descriptor.name, descriptor).is_some() {
                return Err(ConfigError::DuplicateBackend(descriptor.name.to_string()));
            }
            debug!(backend = descriptor.name, provider = provider.name(), "Discovered storage backend");
        }
    }
    Ok(backends)
}

/// Split a `name:data` definition on its first `:`
fn split_definition<'a>(backend: &str, definition: &'a str) -> Result<(&'a str, &'a str)> {
    definition
        .split_once(':')
        .ok_or_else(|| ConfigError::MalformedDefinition {
            backend: backend.to_string(),
            reason: format!("expected name:data, got {:?}", definition),
        })
}

/// Resolves configured backend names to backend instances
pub struct BackendRegistry {
    kinds: BTreeMap<&'static str, BackendDescriptor>,
    definitions: BTreeMap<String, String>,
    default_backend: String,
    context: BackendContext,
    instances: RwLock<HashMap<String, Arc<dyn StorageBackend>>>,
}

impl BackendRegistry {
    /// Build a registry with the built-in backends only
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Self::with_providers(config, &[])
    }

    /// Build a registry with the built-in backends plus `providers`
    pub fn with_providers(config: &StorageConfig, providers: &[&dyn BackendProvider]) -> Result<Self> {
        let mut all: Vec<&dyn BackendProvider> = vec![&BuiltinBackends];
        all.extend_from_slice(providers);
        let kinds = discover_backends(&all)?;

        info!(
            backends = config.backends.len(),
            kinds = kinds.len(),
            "Storage backend registry initialized"
        );

        Ok(Self {
            kinds,
            definitions: config.backends.clone(),
            default_backend: config.default_backend.clone(),
            context: BackendContext {
                temp_dir: config.temp_dir.clone(),
            },
            instances: RwLock::new(HashMap::new()),
        })
    }

    /// Get the backend configured under `backend_name`
    pub fn get_storage(&self, backend_name: &str) -> Result<Arc<dyn StorageBackend>> {
        if let Some(backend) = self.instances.read().get(backend_name) {
            return Ok(Arc::clone(backend));
        }

        let backend = self.instantiate(backend_name)?;
        let mut instances = self.instances.write();
        let backend = instances
            .entry(backend_name.to_string())
            .or_insert(backend);
        Ok(Arc::clone(backend))
    }

    /// The backend used for new uploads
    pub fn default_storage(&self) -> Result<Arc<dyn StorageBackend>> {
        self.get_storage(&self.default_backend)
    }

    /// Name of the backend used for new uploads
    pub fn default_backend(&self) -> &str {
        &self.default_backend
    }

    /// All known backend implementations
    pub fn kinds(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.kinds.values()
    }

    /// Configured backend names and their definitions
    pub fn definitions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.definitions.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check every configured definition without constructing backends
    pub fn validate(&self) -> Result<()> {
        for (backend_name, definition) in &self.definitions {
            let (kind, data) = split_definition(backend_name, definition)?;
            let descriptor = self.descriptor(backend_name, kind)?;
            if !descriptor.simple_data {
                parse_backend_data(data)?;
            }
        }
        if !self.definitions.contains_key(&self.default_backend) {
            return Err(ConfigError::UnknownBackend(self.default_backend.clone()));
        }
        Ok(())
    }

    fn descriptor(&self, backend_name: &str, kind: &str) -> Result<&BackendDescriptor> {
        self.kinds.get(kind).ok_or_else(|| ConfigError::InvalidBackendType {
            backend: backend_name.to_string(),
            kind: kind.to_string(),
        })
    }

    fn instantiate(&self, backend_name: &str) -> Result<Arc<dyn StorageBackend>> {
        let definition = self
            .definitions
            .get(backend_name)
            .ok_or_else(|| ConfigError::UnknownBackend(backend_name.to_string()))?;
        let (kind, data) = split_definition(backend_name, definition)?;
        let descriptor = self.descriptor(backend_name, kind)?;

        let data = if descriptor.simple_data {
            BackendData::Simple(data.to_string())
        } else {
            BackendData::Pairs(parse_backend_data(data)?)
        };

        let backend = (descriptor.factory)(&data, &self.context)?;
        info!(backend = backend_name, kind, "Storage backend created");
        Ok(backend)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.kinds.keys().collect::<Vec<_>>())
            .field("definitions", &self.definitions)
            .field("default_backend", &self.default_backend)
            .finish_non_exhaustive()
    }
}
