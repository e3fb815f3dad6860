//! Stowage Core Library
//!
//! Core abstractions shared by every stowage storage backend.
//! This crate provides:
//! - The storage error taxonomy (`StorageError`, `ConfigError`)
//! - MD5 content checksums computed while streaming (`Checksum`)
//! - Byte source normalization for raw buffers and readers (`ByteSource`)
//! - Safe resolution of object keys under a backend root (`PathResolver`)

pub mod checksum;
pub mod error;
pub mod path;
pub mod source;

pub use checksum::{compute_checksum, copy_with_checksum, Checksum};
pub use error::{ConfigError, Operation, Result, StorageError};
pub use path::{resolve_path, PathResolver};
pub use source::ByteSource;

/// Chunk size used when streaming objects between a source and a sink
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024; // 1 MiB
