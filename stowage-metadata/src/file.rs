//! Stored file records
//!
//! A `StoredFile` owns at most one object in a storage backend. It is
//! either `Empty` (no object bound) or `Bound` (backend name and object id
//! both set). The storage identity is only ever changed by `save`,
//! `bind_existing` and `delete`, so the two columns are never partially
//! set.
//!
//! ```text
//!   Empty ──save()──► Bound ──delete()──► Empty
//! ```

use crate::path_builder::StoragePathBuilder;
use crate::{MetadataError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stowage_core::{ByteSource, Checksum};
use stowage_storage::{BackendRegistry, LocalPath, ObjectReader, SendFile, StorageBackend};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// No backend object bound
    Empty,
    /// Backend object exists and identity columns are set
    Bound,
}

/// A record bound to an object in a storage backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Unique record ID
    pub id: Uuid,

    /// Record type (e.g. `attachment`, `paper_revision`)
    pub kind: String,

    /// Display filename
    pub filename: String,

    /// MIME type
    pub content_type: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Versioned resource this record belongs to
    pub version_of: Option<Uuid>,

    /// Size in bytes, as reported by the backend
    size: Option<u64>,

    /// Name of the backend owning the object
    storage_backend: Option<String>,

    /// Backend-opaque object locator
    storage_file_id: Option<String>,

    /// MD5 checksum of the content
    checksum: Option<Checksum>,
}

impl StoredFile {
    /// Create an empty record
    pub fn new(kind: impl Into<String>, filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            created_at: Utc::now(),
            version_of: None,
            size: None,
            storage_backend: None,
            storage_file_id: None,
            checksum: None,
        }
    }

    /// Set the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn state(&self) -> FileState {
        if self.storage_file_id.is_some() {
            FileState::Bound
        } else {
            FileState::Empty
        }
    }

    pub fn is_stored(&self) -> bool {
        self.state() == FileState::Bound
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn storage_backend(&self) -> Option<&str> {
        self.storage_backend.as_deref()
    }

    pub fn storage_file_id(&self) -> Option<&str> {
        self.storage_file_id.as_deref()
    }

    pub fn checksum(&self) -> Option<Checksum> {
        self.checksum
    }

    pub(crate) fn set_checksum(&mut self, checksum: Checksum) {
        self.checksum = Some(checksum);
    }

    /// Store `data` in the backend chosen by `paths` and bind it to this record.
    ///
    /// The size is read back from the backend after the write. On failure
    /// the record stays `Empty`.
    ///
    /// # Panics
    ///
    /// Panics if the record is already bound to an object.
    pub fn save<'a>(
        &mut self,
        registry: &BackendRegistry,
        paths: &dyn StoragePathBuilder,
        data: impl Into<ByteSource<'a>>,
    ) -> Result<()> {
        assert!(
            self.storage_backend.is_none() && self.storage_file_id.is_none(),
            "stored file {} is already bound to a storage object",
            self.id
        );

        let (backend_name, path) = paths.build_storage_path(self);
        let storage = registry.get_storage(&backend_name)?;
        let (file_id, checksum) = storage.save(&path, &self.content_type, &self.filename, data.into())?;
        let size = match storage.get_size(&file_id) {
            Ok(size) => size,
            Err(e) => {
                // The record stays Empty, so the object must not outlive it
                if let Err(cleanup) = storage.delete(&file_id) {
                    warn!(id = %self.id, file_id = %file_id, error = %cleanup, "Could not remove unrecorded object");
                }
                return Err(e.into());
            }
        };

        self.storage_backend = Some(backend_name);
        self.storage_file_id = Some(file_id);
        self.size = Some(size);
        self.checksum = Some(checksum);

        info!(
            id = %self.id,
            kind = %self.kind,
            backend = ?self.storage_backend,
            size,
            "Stored file"
        );
        Ok(())
    }

    /// Bind an object that already exists in `backend` without reading it.
    ///
    /// Used when importing legacy data; the checksum stays unset until the
    /// backfill computes it.
    pub fn bind_existing(
        &mut self,
        backend: impl Into<String>,
        file_id: impl Into<String>,
        size: u64,
    ) -> Result<()> {
        if self.is_stored() {
            return Err(MetadataError::Invalid(format!(
                "stored file {} is already bound to a storage object",
                self.id
            )));
        }
        self.storage_backend = Some(backend.into());
        self.storage_file_id = Some(file_id.into());
        self.size = Some(size);
        self.checksum = None;
        Ok(())
    }

    /// The backend owning this record's object
    pub fn storage(&self, registry: &BackendRegistry) -> Result<Arc<dyn StorageBackend>> {
        let backend = self.storage_backend.as_deref().ok_or(MetadataError::NoFile("access"))?;
        Ok(registry.get_storage(backend)?)
    }

    fn bound(&self, op: &'static str) -> Result<&str> {
        self.storage_file_id.as_deref().ok_or(MetadataError::NoFile(op))
    }

    /// Open the stored object for reading
    pub fn open(&self, registry: &BackendRegistry) -> Result<ObjectReader> {
        let file_id = self.bound("open")?;
        Ok(self.storage(registry)?.open(file_id)?)
    }

    /// Transport response delivering the object to a client
    pub fn send(&self, registry: &BackendRegistry, inline: bool) -> Result<SendFile> {
        let file_id = self.bound("send")?;
        Ok(self
            .storage(registry)?
            .send_file(file_id, &self.content_type, &self.filename, inline)?)
    }

    /// Scoped local path of the stored object
    pub fn get_local_path(&self, registry: &BackendRegistry) -> Result<LocalPath> {
        let file_id = self.bound("access")?;
        Ok(self.storage(registry)?.get_local_path(file_id)?)
    }

    /// Delete the stored object and reset the record to `Empty`.
    ///
    /// The record itself is kept; destroying it is up to the caller.
    pub fn delete(&mut self, registry: &BackendRegistry) -> Result<()> {
        let file_id = self.bound("delete")?;
        self.storage(registry)?.delete(file_id)?;

        debug!(id = %self.id, file_id = %file_id, "Deleted stored object");
        self.storage_backend = None;
        self.storage_file_id = None;
        self.size = None;
        self.content_type.clear();
        self.filename.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_builder::DefaultPathBuilder;
    use std::io::Read;
    use std::sync::atomic::{AtomicBool, Ordering};
    use stowage_core::{Operation, StorageError};
    use stowage_storage::{BackendDescriptor, BackendProvider, MemoryBackend, StorageConfig};
    use tempfile::TempDir;

    /// Memory backend whose first size lookup fails
    #[derive(Debug, Default)]
    struct UnsizedOnce {
        inner: MemoryBackend,
        failed: AtomicBool,
    }

    impl StorageBackend for UnsizedOnce {
        fn open(&self, file_id: &str) -> stowage_core::Result<ObjectReader> {
            self.inner.open(file_id)
        }

        fn save(
            &self,
            name: &str,
            content_type: &str,
            filename: &str,
            data: ByteSource<'_>,
        ) -> stowage_core::Result<(String, Checksum)> {
            self.inner.save(name, content_type, filename, data)
        }

        fn delete(&self, file_id: &str) -> stowage_core::Result<()> {
            self.inner.delete(file_id)
        }

        fn get_size(&self, file_id: &str) -> stowage_core::Result<u64> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(StorageError::operation(Operation::GetSize, file_id, "transient"));
            }
            self.inner.get_size(file_id)
        }

        fn send_file(
            &self,
            file_id: &str,
            content_type: &str,
            filename: &str,
            inline: bool,
        ) -> stowage_core::Result<SendFile> {
            self.inner.send_file(file_id, content_type, filename, inline)
        }
    }

    struct UnsizedProvider;

    impl BackendProvider for UnsizedProvider {
        fn name(&self) -> &str {
            "unsized"
        }

        fn backends(&self) -> Vec<BackendDescriptor> {
            vec![BackendDescriptor {
                name: "unsized",
                simple_data: true,
                factory: |_, _| Ok(Arc::new(UnsizedOnce::default())),
            }]
        }
    }

    fn registry(dir: &TempDir) -> BackendRegistry {
        let config = StorageConfig::new()
            .with_backend("default", format!("fs:{}", dir.path().display()))
            .with_backend("mem", "memory:capacity=0");
        BackendRegistry::new(&config).unwrap()
    }

    #[test]
    fn test_save_binds_record() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let mut file = StoredFile::new("attachment", "notes.txt", "text/plain");
        assert_eq!(file.state(), FileState::Empty);

        file.save(&registry, &DefaultPathBuilder::new("default"), &b"hello test"[..])
            .unwrap();

        assert_eq!(file.state(), FileState::Bound);
        assert_eq!(file.storage_backend(), Some("default"));
        assert_eq!(file.size(), Some(10));
        assert_eq!(file.checksum().unwrap().to_hex(), "7a6d667ea5ed4467c017b2ed6ea07e78");

        let mut buf = String::new();
        file.open(&registry).unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello test");
    }

    #[test]
    #[should_panic(expected = "already bound")]
    fn test_double_save_panics() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let paths = DefaultPathBuilder::new("mem");
        let mut file = StoredFile::new("attachment", "a.txt", "text/plain");

        file.save(&registry, &paths, &b"one"[..]).unwrap();
        let _ = file.save(&registry, &paths, &b"two"[..]);
    }

    #[test]
    fn test_failed_save_stays_empty() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let paths = |_: &StoredFile| ("default".to_string(), "taken".to_string());

        let mut first = StoredFile::new("attachment", "a", "");
        first.save(&registry, &paths, &b"first"[..]).unwrap();

        let mut second = StoredFile::new("attachment", "b", "");
        let err = second.save(&registry, &paths, &b"second"[..]).unwrap_err();
        assert!(matches!(err, MetadataError::Storage(_)));
        assert_eq!(second.state(), FileState::Empty);
        assert_eq!(second.storage_backend(), None);
    }

    #[test]
    fn test_failed_size_lookup_removes_object() {
        let config = StorageConfig::new().with_backend("flaky", "unsized:any");
        let registry = BackendRegistry::with_providers(&config, &[&UnsizedProvider]).unwrap();
        let paths = DefaultPathBuilder::new("flaky");
        let mut file = StoredFile::new("attachment", "a.txt", "text/plain");

        let err = file.save(&registry, &paths, &b"payload"[..]).unwrap_err();
        assert!(err.to_string().contains("transient"), "{err}");
        assert_eq!(file.state(), FileState::Empty);

        // Same record, same generated name: the retry is not blocked by a leftover object
        file.save(&registry, &paths, &b"payload"[..]).unwrap();
        assert_eq!(file.state(), FileState::Bound);
        assert_eq!(file.size(), Some(7));
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let mut file = StoredFile::new("attachment", "a", "");
        let err = file
            .save(&registry, &DefaultPathBuilder::new("nowhere"), &b"x"[..])
            .unwrap_err();
        assert!(matches!(err, MetadataError::Config(_)));
    }

    #[test]
    fn test_delete_resets_identity() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let mut file = StoredFile::new("attachment", "a.txt", "text/plain");
        file.save(&registry, &DefaultPathBuilder::new("default"), &b"x"[..])
            .unwrap();
        let file_id = file.storage_file_id().unwrap().to_string();

        file.delete(&registry).unwrap();
        assert_eq!(file.state(), FileState::Empty);
        assert_eq!(file.storage_backend(), None);
        assert_eq!(file.size(), None);
        assert!(file.filename.is_empty());
        assert!(file.content_type.is_empty());
        assert!(!dir.path().join(file_id).exists());
    }

    #[test]
    fn test_operations_on_empty_record() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let mut file = StoredFile::new("attachment", "a.txt", "text/plain");

        assert!(matches!(file.open(&registry), Err(MetadataError::NoFile("open"))));
        assert!(matches!(file.send(&registry, true), Err(MetadataError::NoFile("send"))));
        assert!(matches!(file.delete(&registry), Err(MetadataError::NoFile("delete"))));
        assert_eq!(
            MetadataError::NoFile("open").to_string(),
            "There is no file to open"
        );
    }

    #[test]
    fn test_send_uses_record_metadata() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let mut file = StoredFile::new("attachment", "slides.pdf", "application/pdf");
        file.save(&registry, &DefaultPathBuilder::new("default"), &b"%PDF"[..])
            .unwrap();

        let response = file.send(&registry, false).unwrap().into_stream().unwrap();
        assert_eq!(response.content_type, "application/pdf");
        assert_eq!(response.disposition.to_string(), "attachment; filename=\"slides.pdf\"");
    }

    #[test]
    fn test_bind_existing_has_no_checksum() {
        let mut file = StoredFile::new("attachment", "legacy.bin", "");
        file.bind_existing("default", "legacy/1", 3).unwrap();
        assert!(file.is_stored());
        assert_eq!(file.checksum(), None);
        assert!(file.bind_existing("default", "legacy/2", 3).is_err());
    }
}
