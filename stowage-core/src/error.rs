//! Error types for stowage
//!
//! `StorageError` is the uniform failure surface of every backend. OS and
//! serialization faults are caught at the backend boundary and re-wrapped
//! with the offending identifier, so callers never see which concrete
//! backend raised them.

use std::fmt;
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Backend operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Save,
    Delete,
    GetSize,
    Send,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Operation::Open => "open",
            Operation::Save => "save",
            Operation::Delete => "delete",
            Operation::GetSize => "get size of",
            Operation::Send => "send",
        };
        f.write_str(verb)
    }
}

/// Unified error type for storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    /// Any I/O-level failure of a backend operation
    #[error("Could not {op} \"{id}\": {cause}")]
    Operation {
        op: Operation,
        id: String,
        cause: String,
    },

    /// The object key would resolve outside of the backend root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Mutation attempted on a read-only backend
    #[error("{0}")]
    ReadOnly(String),

    #[error("Storage full: {used} / {capacity} bytes")]
    StorageFull { used: u64, capacity: u64 },
}

impl StorageError {
    /// Wrap an underlying cause for the given operation and identifier
    pub fn operation(op: Operation, id: impl Into<String>, cause: impl fmt::Display) -> Self {
        StorageError::Operation {
            op,
            id: id.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether this error was raised by a read-only backend
    pub fn is_read_only(&self) -> bool {
        matches!(self, StorageError::ReadOnly(_))
    }

    /// Whether this error is a rejected object key
    pub fn is_invalid_path(&self) -> bool {
        matches!(self, StorageError::InvalidPath(_))
    }

    /// The operation that failed, if this is an operation error
    pub fn op(&self) -> Option<Operation> {
        match self {
            StorageError::Operation { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// The object identifier or key this error refers to
    pub fn id(&self) -> Option<&str> {
        match self {
            StorageError::Operation { id, .. } => Some(id),
            StorageError::InvalidPath(key) => Some(key),
            _ => None,
        }
    }
}

/// Configuration errors
///
/// Raised when the backend registry is built or a backend is first
/// resolved; never deferred to the first read or write.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Storage backend does not exist: {0}")]
    UnknownBackend(String),

    #[error("Storage backend {backend} has invalid type {kind}")]
    InvalidBackendType { backend: String, kind: String },

    #[error("Duplicate storage backend type: {0}")]
    DuplicateBackend(String),

    #[error("Malformed definition for storage backend {backend}: {reason}")]
    MalformedDefinition { backend: String, reason: String },

    #[error("Malformed backend data: {0}")]
    MalformedData(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
