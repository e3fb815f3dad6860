//! Read-only backend decorator
//!
//! Wraps any backend and unconditionally refuses `save` and `delete` with
//! `StorageError::ReadOnly`. Reads go straight to the wrapped backend.

use crate::backend::{LocalPath, ObjectReader, SendFile, StorageBackend};
use crate::fs::FileSystemBackend;
use std::path::PathBuf;
use stowage_core::error::{Result, StorageError};
use stowage_core::{ByteSource, Checksum};

/// Read-only view of a storage backend
#[derive(Debug, Clone)]
pub struct ReadOnly<B> {
    inner: B,
}

/// Read-only filesystem backend
pub type ReadOnlyFileSystemBackend = ReadOnly<FileSystemBackend>;

impl<B: StorageBackend> ReadOnly<B> {
    /// Wrap a backend
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    /// The wrapped backend
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl ReadOnly<FileSystemBackend> {
    /// Registered backend name
    pub const NAME: &'static str = "fs-readonly";

    /// Read-only filesystem backend rooted at `root`
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::new(FileSystemBackend::new(root))
    }
}

impl<B: StorageBackend> StorageBackend for ReadOnly<B> {
    fn open(&self, file_id: &str) -> Result<ObjectReader> {
        self.inner.open(file_id)
    }

    fn save(
        &self,
        _name: &str,
        _content_type: &str,
        _filename: &str,
        _data: ByteSource<'_>,
    ) -> Result<(String, Checksum)> {
        Err(StorageError::ReadOnly("Cannot write to read-only storage".to_string()))
    }

    fn delete(&self, _file_id: &str) -> Result<()> {
        Err(StorageError::ReadOnly("Cannot delete from read-only storage".to_string()))
    }

    fn get_size(&self, file_id: &str) -> Result<u64> {
        self.inner.get_size(file_id)
    }

    fn send_file(
        &self,
        file_id: &str,
        content_type: &str,
        filename: &str,
        inline: bool,
    ) -> Result<SendFile> {
        self.inner.send_file(file_id, content_type, filename, inline)
    }

    fn get_local_path(&self, file_id: &str) -> Result<LocalPath> {
        self.inner.get_local_path(file_id)
    }
}
