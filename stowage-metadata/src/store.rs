//! Record persistence
//!
//! `RecordStore` keeps stored file records grouped by kind and versioned
//! resources referring to them. Version rows belong to their resource:
//! deleting the resource deletes them too.

use crate::file::StoredFile;
use crate::versioned::VersionedResource;
use crate::{MetadataError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use stowage_core::Checksum;
use uuid::Uuid;

/// Persistence for stored file records and versioned resources
pub trait RecordStore: Send + Sync {
    /// Insert or replace a file record
    fn put_file(&self, file: &StoredFile) -> Result<()>;

    fn get_file(&self, kind: &str, id: Uuid) -> Result<Option<StoredFile>>;

    /// Remove a file record, returning whether it existed
    fn delete_file(&self, kind: &str, id: Uuid) -> Result<bool>;

    /// All records of `kind`, ordered by id
    fn list_files(&self, kind: &str) -> Result<Vec<StoredFile>>;

    /// Every kind with at least one record
    fn kinds(&self) -> Result<Vec<String>>;

    /// Bound records of `kind` without a checksum, ordered by id.
    ///
    /// Returns at most `limit` rows with an id strictly greater than `after`.
    fn files_missing_checksum(&self, kind: &str, after: Option<Uuid>, limit: usize) -> Result<Vec<StoredFile>>;

    /// Write checksums for a batch of records in one commit.
    ///
    /// Rows that no longer exist are skipped. Returns the number updated.
    fn update_checksums(&self, kind: &str, updates: &[(Uuid, Checksum)]) -> Result<usize>;

    /// Insert or replace a resource together with its versions
    fn put_resource(&self, resource: &VersionedResource) -> Result<()>;

    fn get_resource(&self, id: Uuid) -> Result<Option<VersionedResource>>;

    /// Remove a resource and all of its versions
    fn delete_resource(&self, id: Uuid) -> Result<bool>;
}

/// Persisted form of a versioned resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ResourceRow {
    pub id: Uuid,
    pub kind: String,
    pub current: Option<Uuid>,
    pub versions: Vec<Uuid>,
}

impl ResourceRow {
    pub(crate) fn from_resource(resource: &VersionedResource) -> Self {
        Self {
            id: resource.id,
            kind: resource.kind.clone(),
            current: resource.current_id(),
            versions: resource.version_ids(),
        }
    }

    /// Reassemble the resource from its row and version records
    pub(crate) fn into_resource(self, versions: Vec<Option<StoredFile>>) -> Result<VersionedResource> {
        let versions = self
            .versions
            .iter()
            .zip(versions)
            .map(|(id, file)| {
                file.ok_or_else(|| {
                    MetadataError::NotFound(format!("version {} of resource {}", id, self.id))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        VersionedResource::from_parts(self.id, self.kind, self.current, versions)
    }
}

pub(crate) fn needs_checksum(file: &StoredFile) -> bool {
    file.is_stored() && file.checksum().is_none()
}

// ===== In-memory store =====

#[derive(Default)]
struct Records {
    files: BTreeMap<String, BTreeMap<Uuid, StoredFile>>,
    resources: HashMap<Uuid, ResourceRow>,
}

/// In-memory record store (for testing)
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Records>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn put_file(&self, file: &StoredFile) -> Result<()> {
        self.records
            .write()
            .files
            .entry(file.kind.clone())
            .or_default()
            .insert(file.id, file.clone());
        Ok(())
    }

    fn get_file(&self, kind: &str, id: Uuid) -> Result<Option<StoredFile>> {
        Ok(self
            .records
            .read()
            .files
            .get(kind)
            .and_then(|files| files.get(&id))
            .cloned())
    }

    fn delete_file(&self, kind: &str, id: Uuid) -> Result<bool> {
        let mut records = self.records.write();
        let removed = records
            .files
            .get_mut(kind)
            .map(|files| files.remove(&id).is_some())
            .unwrap_or(false);
        if records.files.get(kind).is_some_and(|files| files.is_empty()) {
            records.files.remove(kind);
        }
        Ok(removed)
    }

    fn list_files(&self, kind: &str) -> Result<Vec<StoredFile>> {
        Ok(self
            .records
            .read()
            .files
            .get(kind)
            .map(|files| files.values().cloned().collect())
            .unwrap_or_default())
    }

    fn kinds(&self) -> Result<Vec<String>> {
        Ok(self.records.read().files.keys().cloned().collect())
    }

    fn files_missing_checksum(&self, kind: &str, after: Option<Uuid>, limit: usize) -> Result<Vec<StoredFile>> {
        let records = self.records.read();
        let Some(files) = records.files.get(kind) else {
            return Ok(Vec::new());
        };
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(files
            .range((lower, Bound::Unbounded))
            .map(|(_, file)| file)
            .filter(|file| needs_checksum(file))
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_checksums(&self, kind: &str, updates: &[(Uuid, Checksum)]) -> Result<usize> {
        let mut records = self.records.write();
        let Some(files) = records.files.get_mut(kind) else {
            return Ok(0);
        };
        let mut updated = 0;
        for (id, checksum) in updates {
            if let Some(file) = files.get_mut(id) {
                file.set_checksum(*checksum);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn put_resource(&self, resource: &VersionedResource) -> Result<()> {
        let mut records = self.records.write();
        let files = records.files.entry(resource.kind.clone()).or_default();
        for version in resource.all_files() {
            files.insert(version.id, version.clone());
        }
        records.resources.insert(resource.id, ResourceRow::from_resource(resource));
        Ok(())
    }

    fn get_resource(&self, id: Uuid) -> Result<Option<VersionedResource>> {
        let records = self.records.read();
        let Some(row) = records.resources.get(&id).cloned() else {
            return Ok(None);
        };
        let files = records.files.get(&row.kind);
        let versions = row
            .versions
            .iter()
            .map(|v| files.and_then(|files| files.get(v)).cloned())
            .collect();
        row.into_resource(versions).map(Some)
    }

    fn delete_resource(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write();
        let Some(row) = records.resources.remove(&id) else {
            return Ok(false);
        };
        if let Some(files) = records.files.get_mut(&row.kind) {
            for version in &row.versions {
                files.remove(version);
            }
            if files.is_empty() {
                records.files.remove(&row.kind);
            }
        }
        Ok(true)
    }
}
