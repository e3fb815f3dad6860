//! Stowage Metadata
//!
//! Binds persisted records to objects in a storage backend.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      RecordStore                          │
//! │         (SledRecordStore / MemoryRecordStore)             │
//! │                                                           │
//! │  ┌──────────────┐   ┌─────────────────────┐               │
//! │  │  StoredFile  │◄──│  VersionedResource  │               │
//! │  │  lifecycle   │   │  (current + history)│               │
//! │  └──────┬───────┘   └─────────────────────┘               │
//! │         │                                                 │
//! │  ┌──────▼───────────────────────────────────────────────┐ │
//! │  │             BackendRegistry (stowage-storage)         │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use stowage_metadata::{DefaultPathBuilder, StoredFile};
//!
//! let mut file = StoredFile::new("attachment", "slides.pdf", "application/pdf");
//! file.save(&registry, &DefaultPathBuilder::new("default"), bytes)?;
//! let reader = file.open(&registry)?;
//! ```

pub mod backfill;
pub mod file;
pub mod path_builder;
pub mod sled_store;
pub mod store;
pub mod versioned;

pub use backfill::{BackfillReport, ChecksumBackfill, KindReport, RowOutcome};
pub use file::{FileState, StoredFile};
pub use path_builder::{secure_filename, DefaultPathBuilder, StoragePathBuilder};
pub use sled_store::SledRecordStore;
pub use store::{MemoryRecordStore, RecordStore};
pub use versioned::VersionedResource;

use stowage_core::error::{ConfigError, StorageError};
use thiserror::Error;

/// Result type alias for metadata operations
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Metadata error types
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Operation needs a bound storage object but the record has none
    #[error("There is no file to {0}")]
    NoFile(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Invalid(String),
}

impl From<sled::Error> for MetadataError {
    fn from(err: sled::Error) -> Self {
        MetadataError::Database(err.to_string())
    }
}
