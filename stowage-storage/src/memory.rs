//! In-memory storage backend
//!
//! Used for testing and development. Not persistent. Object ids are
//! minted by the backend rather than taken from the caller's name, and
//! there is no local path, so `get_local_path` always goes through a
//! temporary copy.

use crate::backend::{FileResponse, LocalPath, ObjectReader, SendFile, StorageBackend, StorageStats};
use bytes::{Buf, Bytes};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use stowage_core::error::{Operation, Result, StorageError};
use stowage_core::{copy_with_checksum, ByteSource, Checksum, DEFAULT_CHUNK_SIZE};
use tracing::debug;
use uuid::Uuid;

/// Stored object with the metadata given at save time
#[derive(Debug, Clone)]
struct MemoryObject {
    name: String,
    content_type: String,
    filename: String,
    data: Bytes,
}

#[derive(Debug, Default)]
struct Objects {
    /// Objects by minted id
    by_id: HashMap<String, MemoryObject>,
    /// Caller-supplied names to ids
    by_name: HashMap<String, String>,
}

/// In-memory storage backend
#[derive(Debug)]
pub struct MemoryBackend {
    /// Object storage
    objects: RwLock<Objects>,

    /// Maximum capacity (0 = unlimited)
    max_capacity: u64,

    /// Directory for temporary local copies
    temp_dir: PathBuf,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBackend {
    /// Registered backend name
    pub const NAME: &'static str = "memory";

    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with a maximum capacity
    pub fn with_capacity(max_bytes: u64) -> Self {
        Self {
            objects: RwLock::new(Objects::default()),
            max_capacity: max_bytes,
            temp_dir: std::env::temp_dir(),
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Set the directory used for temporary local copies
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Current statistics
    pub fn stats(&self) -> StorageStats {
        let objects = self.objects.read();
        StorageStats {
            object_count: objects.by_id.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Clear all stored objects
    pub fn clear(&self) {
        let mut objects = self.objects.write();
        objects.by_id.clear();
        objects.by_name.clear();
        self.bytes_used.store(0, Ordering::SeqCst);
    }

    fn get(&self, file_id: &str, op: Operation) -> Result<MemoryObject> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.objects
            .read()
            .by_id
            .get(file_id)
            .cloned()
            .ok_or_else(|| StorageError::operation(op, file_id, "No such object"))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn open(&self, file_id: &str) -> Result<ObjectReader> {
        let object = self.get(file_id, Operation::Open)?;
        Ok(Box::new(object.data.reader()))
    }

    fn save(
        &self,
        name: &str,
        content_type: &str,
        filename: &str,
        mut data: ByteSource<'_>,
    ) -> Result<(String, Checksum)> {
        let fail = |cause: &dyn std::fmt::Display| StorageError::operation(Operation::Save, name, cause);

        if self.objects.read().by_name.contains_key(name) {
            return Err(fail(&"A file with this name already exists"));
        }

        let mut buf = Vec::with_capacity(data.len_hint().unwrap_or(0) as usize);
        let checksum = copy_with_checksum(&mut data, &mut buf, DEFAULT_CHUNK_SIZE).map_err(|e| fail(&e))?;
        let data_len = buf.len() as u64;

        // Check capacity
        if self.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst);
            if current + data_len > self.max_capacity {
                return Err(StorageError::StorageFull {
                    used: current,
                    capacity: self.max_capacity,
                });
            }
        }

        let mut objects = self.objects.write();
        if objects.by_name.contains_key(name) {
            return Err(fail(&"A file with this name already exists"));
        }

        let file_id = Uuid::new_v4().to_string();
        objects.by_name.insert(name.to_string(), file_id.clone());
        objects.by_id.insert(
            file_id.clone(),
            MemoryObject {
                name: name.to_string(),
                content_type: content_type.to_string(),
                filename: filename.to_string(),
                data: Bytes::from(buf),
            },
        );
        self.bytes_used.fetch_add(data_len, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        debug!(file_id = %file_id, name = %name, size = data_len, "Stored object");
        Ok((file_id, checksum))
    }

    fn delete(&self, file_id: &str) -> Result<()> {
        let mut objects = self.objects.write();

        let old = objects
            .by_id
            .remove(file_id)
            .ok_or_else(|| StorageError::operation(Operation::Delete, file_id, "No such object"))?;
        objects.by_name.remove(&old.name);
        self.bytes_used
            .fetch_sub(old.data.len() as u64, Ordering::SeqCst);
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get_size(&self, file_id: &str) -> Result<u64> {
        let objects = self.objects.read();
        objects
            .by_id
            .get(file_id)
            .map(|object| object.data.len() as u64)
            .ok_or_else(|| StorageError::operation(Operation::GetSize, file_id, "No such object"))
    }

    fn send_file(
        &self,
        file_id: &str,
        content_type: &str,
        filename: &str,
        inline: bool,
    ) -> Result<SendFile> {
        let object = self.get(file_id, Operation::Send)?;
        let content_type = if content_type.is_empty() {
            object.content_type.as_str()
        } else {
            content_type
        };
        let filename = if filename.is_empty() {
            object.filename.as_str()
        } else {
            filename
        };

        let length = object.data.len() as u64;
        let response = FileResponse::new(Box::new(object.data.clone().reader()), content_type, filename, inline)
            .with_length(length);
        Ok(SendFile::Stream(response))
    }

    fn get_local_path(&self, file_id: &str) -> Result<LocalPath> {
        LocalPath::temporary_copy(self.open(file_id)?, &self.temp_dir, file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_all(backend: &MemoryBackend, file_id: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        backend.open(file_id).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_save_open() {
        let backend = MemoryBackend::new();
        let (file_id, checksum) = backend
            .save("a/b.txt", "text/plain", "b.txt", ByteSource::from("hello test"))
            .unwrap();

        assert_ne!(file_id, "a/b.txt");
        assert_eq!(checksum.to_hex(), "7a6d667ea5ed4467c017b2ed6ea07e78");
        assert_eq!(read_all(&backend, &file_id), b"hello test");
        assert_eq!(backend.get_size(&file_id).unwrap(), 10);
    }

    #[test]
    fn test_delete() {
        let backend = MemoryBackend::new();
        let (file_id, _) = backend.save("x", "", "x", ByteSource::from("hello")).unwrap();

        backend.delete(&file_id).unwrap();
        assert!(backend.open(&file_id).is_err());

        // Deleting again fails
        assert!(backend.delete(&file_id).is_err());

        // The name is free again
        backend.save("x", "", "x", ByteSource::from("again")).unwrap();
    }

    #[test]
    fn test_duplicate_name() {
        let backend = MemoryBackend::new();
        backend.save("x", "", "x", ByteSource::from("1")).unwrap();
        let err = backend.save("x", "", "x", ByteSource::from("2")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_capacity_limit() {
        let backend = MemoryBackend::with_capacity(100);

        backend.save("1", "", "1", ByteSource::from(vec![0u8; 50])).unwrap();
        backend.save("2", "", "2", ByteSource::from(vec![0u8; 50])).unwrap();

        let result = backend.save("3", "", "3", ByteSource::from(vec![0u8; 1]));
        assert!(matches!(result, Err(StorageError::StorageFull { used: 100, capacity: 100 })));
    }

    #[test]
    fn test_stats() {
        let backend = MemoryBackend::with_capacity(1000);
        let (file_id, _) = backend.save("s", "", "s", ByteSource::from(vec![0u8; 100])).unwrap();
        backend.open(&file_id).unwrap();
        backend.open(&file_id).unwrap();

        let stats = backend.stats();
        assert_eq!(stats.object_count, 1);
        assert_eq!(stats.bytes_used, 100);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.usage_percent(), 10.0);
    }

    #[test]
    fn test_local_path_is_temporary() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = MemoryBackend::new().with_temp_dir(dir.path());
        let (file_id, _) = backend.save("x", "", "x", ByteSource::from("local")).unwrap();

        let local = backend.get_local_path(&file_id).unwrap();
        let path = local.path().to_path_buf();
        assert!(local.is_temporary());
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"local");

        drop(local);
        assert!(!path.exists());
    }

    #[test]
    fn test_send_uses_stored_metadata() {
        let backend = MemoryBackend::new();
        let (file_id, _) = backend.save("x", "text/csv", "report.csv", ByteSource::from("a,b")).unwrap();

        let response = backend.send_file(&file_id, "", "", true).unwrap().into_stream().unwrap();
        assert_eq!(response.content_type, "text/csv");
        assert_eq!(response.disposition.to_string(), "inline; filename=\"report.csv\"");
    }
}
