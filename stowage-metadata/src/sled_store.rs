//! Sled-based record storage
//!
//! Each record kind lives in its own tree (`files:<kind>`) keyed by the
//! record id bytes, so iteration order is id order. Resources live in the
//! `resources` tree and refer to their versions by id.

use crate::file::StoredFile;
use crate::store::{needs_checksum, RecordStore, ResourceRow};
use crate::versioned::VersionedResource;
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::ops::Bound;
use std::path::Path;
use stowage_core::Checksum;
use tracing::{debug, info};
use uuid::Uuid;

const FILES_PREFIX: &str = "files:";
const RESOURCES_TREE: &str = "resources";

/// Sled-based record store
pub struct SledRecordStore {
    db: sled::Db,
}

impl SledRecordStore {
    /// Open or create a record store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!(path = ?path.as_ref(), "Opening Sled record store");
        let db = sled::open(path.as_ref())?;
        Ok(Self { db })
    }

    /// Open an in-memory store (for testing)
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn files_tree(&self, kind: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(format!("{}{}", FILES_PREFIX, kind))?)
    }

    fn resources_tree(&self) -> Result<sled::Tree> {
        Ok(self.db.open_tree(RESOURCES_TREE)?)
    }

    fn put_value<K: AsRef<[u8]>, V: Serialize>(tree: &sled::Tree, key: K, value: &V) -> Result<()> {
        let encoded = bincode::serialize(value)?;
        tree.insert(key, encoded)?;
        Ok(())
    }

    fn get_value<K: AsRef<[u8]>, V: DeserializeOwned>(tree: &sled::Tree, key: K) -> Result<Option<V>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size estimate
    pub fn size_on_disk(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

impl RecordStore for SledRecordStore {
    fn put_file(&self, file: &StoredFile) -> Result<()> {
        let tree = self.files_tree(&file.kind)?;
        Self::put_value(&tree, file.id.as_bytes(), file)?;
        debug!(id = %file.id, kind = %file.kind, "Stored file record");
        Ok(())
    }

    fn get_file(&self, kind: &str, id: Uuid) -> Result<Option<StoredFile>> {
        let tree = self.files_tree(kind)?;
        Self::get_value(&tree, id.as_bytes())
    }

    fn delete_file(&self, kind: &str, id: Uuid) -> Result<bool> {
        let tree = self.files_tree(kind)?;
        Ok(tree.remove(id.as_bytes())?.is_some())
    }

    fn list_files(&self, kind: &str) -> Result<Vec<StoredFile>> {
        let tree = self.files_tree(kind)?;
        let mut files = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            files.push(bincode::deserialize(&value)?);
        }
        Ok(files)
    }

    fn kinds(&self) -> Result<Vec<String>> {
        let mut kinds = Vec::new();
        for name in self.db.tree_names() {
            let Some(kind) = std::str::from_utf8(&name).ok().and_then(|n| n.strip_prefix(FILES_PREFIX)) else {
                continue;
            };
            if !self.db.open_tree(&name)?.is_empty() {
                kinds.push(kind.to_string());
            }
        }
        kinds.sort();
        Ok(kinds)
    }

    fn files_missing_checksum(&self, kind: &str, after: Option<Uuid>, limit: usize) -> Result<Vec<StoredFile>> {
        let tree = self.files_tree(kind)?;
        let lower = match after {
            Some(id) => Bound::Excluded(id.as_bytes().to_vec()),
            None => Bound::Unbounded,
        };

        let mut files = Vec::new();
        for item in tree.range::<Vec<u8>, _>((lower, Bound::Unbounded)) {
            if files.len() >= limit {
                break;
            }
            let (_, value) = item?;
            let file: StoredFile = bincode::deserialize(&value)?;
            if needs_checksum(&file) {
                files.push(file);
            }
        }
        Ok(files)
    }

    fn update_checksums(&self, kind: &str, updates: &[(Uuid, Checksum)]) -> Result<usize> {
        let tree = self.files_tree(kind)?;
        let mut batch = sled::Batch::default();
        let mut updated = 0;

        for (id, checksum) in updates {
            let Some(mut file) = Self::get_value::<_, StoredFile>(&tree, id.as_bytes())? else {
                continue;
            };
            file.set_checksum(*checksum);
            batch.insert(&id.as_bytes()[..], bincode::serialize(&file)?);
            updated += 1;
        }

        tree.apply_batch(batch)?;
        self.db.flush()?;
        debug!(kind, updated, "Committed checksum batch");
        Ok(updated)
    }

    fn put_resource(&self, resource: &VersionedResource) -> Result<()> {
        let files = self.files_tree(&resource.kind)?;
        let mut batch = sled::Batch::default();
        for version in resource.all_files() {
            batch.insert(&version.id.as_bytes()[..], bincode::serialize(version)?);
        }
        files.apply_batch(batch)?;

        let resources = self.resources_tree()?;
        Self::put_value(&resources, resource.id.as_bytes(), &ResourceRow::from_resource(resource))?;
        debug!(id = %resource.id, versions = resource.len(), "Stored resource");
        Ok(())
    }

    fn get_resource(&self, id: Uuid) -> Result<Option<VersionedResource>> {
        let resources = self.resources_tree()?;
        let Some(row) = Self::get_value::<_, ResourceRow>(&resources, id.as_bytes())? else {
            return Ok(None);
        };
        let files = self.files_tree(&row.kind)?;
        let versions = row
            .versions
            .iter()
            .map(|v| Self::get_value(&files, v.as_bytes()))
            .collect::<Result<Vec<Option<StoredFile>>>>()?;
        row.into_resource(versions).map(Some)
    }

    fn delete_resource(&self, id: Uuid) -> Result<bool> {
        let resources = self.resources_tree()?;
        let Some(row) = Self::get_value::<_, ResourceRow>(&resources, id.as_bytes())? else {
            return Ok(false);
        };

        resources.remove(id.as_bytes())?;
        let files = self.files_tree(&row.kind)?;
        let mut batch = sled::Batch::default();
        for version in &row.versions {
            batch.remove(&version.as_bytes()[..]);
        }
        files.apply_batch(batch)?;

        debug!(id = %id, versions = row.versions.len(), "Deleted resource");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bound(kind: &str, name: &str) -> StoredFile {
        let mut file = StoredFile::new(kind, name, "application/pdf");
        file.bind_existing("default", format!("{}/{}", kind, name), 42).unwrap();
        file
    }

    #[test]
    fn test_file_records() {
        let store = SledRecordStore::open_temporary().unwrap();
        let file = bound("attachment", "a.pdf");
        store.put_file(&file).unwrap();

        let retrieved = store.get_file("attachment", file.id).unwrap().unwrap();
        assert_eq!(retrieved, file);
        assert_eq!(retrieved.size(), Some(42));
        assert!(store.get_file("paper", file.id).unwrap().is_none());

        assert!(store.delete_file("attachment", file.id).unwrap());
        assert!(store.get_file("attachment", file.id).unwrap().is_none());
    }

    #[test]
    fn test_kinds_and_listing() {
        let store = SledRecordStore::open_temporary().unwrap();
        for i in 0..5 {
            store.put_file(&bound("attachment", &format!("file_{}", i))).unwrap();
        }
        store.put_file(&bound("paper_revision", "p")).unwrap();

        assert_eq!(store.kinds().unwrap(), vec!["attachment", "paper_revision"]);
        let files = store.list_files("attachment").unwrap();
        assert_eq!(files.len(), 5);
        assert!(files.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_checksum_pages() {
        let store = SledRecordStore::open_temporary().unwrap();
        for i in 0..7 {
            store.put_file(&bound("attachment", &i.to_string())).unwrap();
        }

        let page = store.files_missing_checksum("attachment", None, 4).unwrap();
        assert_eq!(page.len(), 4);
        let updates: Vec<_> = page.iter().map(|f| (f.id, Checksum::compute(f.filename.as_bytes()))).collect();
        assert_eq!(store.update_checksums("attachment", &updates).unwrap(), 4);

        let rest = store.files_missing_checksum("attachment", None, 10).unwrap();
        assert_eq!(rest.len(), 3);
        assert!(rest.iter().all(|f| f.checksum().is_none()));

        let after = store
            .files_missing_checksum("attachment", rest.first().map(|f| f.id), 10)
            .unwrap();
        assert_eq!(after.len(), 2);
    }

    #[test]
    fn test_resource_roundtrip_and_cascade() {
        let store = SledRecordStore::open_temporary().unwrap();
        let mut resource = VersionedResource::new("attachment");
        resource.set_file(bound("ignored", "v1"));
        resource.set_file(bound("ignored", "v2"));
        store.put_resource(&resource).unwrap();

        let loaded = store.get_resource(resource.id).unwrap().unwrap();
        assert_eq!(loaded, resource);
        assert_eq!(loaded.file().unwrap().filename, "v2");

        assert!(store.delete_resource(resource.id).unwrap());
        assert!(store.get_resource(resource.id).unwrap().is_none());
        assert!(store.list_files("attachment").unwrap().is_empty());
        assert!(!store.delete_resource(resource.id).unwrap());
    }

    #[test]
    fn test_reopen_persists() {
        let dir = TempDir::new().unwrap();
        let file = bound("attachment", "kept");
        {
            let store = SledRecordStore::open(dir.path().join("db")).unwrap();
            store.put_file(&file).unwrap();
            store.flush().unwrap();
        }
        let store = SledRecordStore::open(dir.path().join("db")).unwrap();
        assert_eq!(store.get_file("attachment", file.id).unwrap(), Some(file));
    }
}
