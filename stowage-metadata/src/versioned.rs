//! Versioned resources
//!
//! A resource owning every uploaded version of its file plus one pointer
//! to the current version. The pointer can be moved between versions but
//! never cleared.

use crate::file::StoredFile;
use crate::{MetadataError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resource with a current file and a version history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedResource {
    /// Unique resource ID
    pub id: Uuid,

    /// Record kind assigned to every version
    pub kind: String,

    current: Option<Uuid>,
    versions: Vec<StoredFile>,
}

impl VersionedResource {
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind)
    }

    pub fn with_id(id: Uuid, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            current: None,
            versions: Vec::new(),
        }
    }

    /// Rebuild a resource from persisted parts
    pub fn from_parts(id: Uuid, kind: impl Into<String>, current: Option<Uuid>, versions: Vec<StoredFile>) -> Result<Self> {
        if let Some(current) = current {
            if !versions.iter().any(|v| v.id == current) {
                return Err(MetadataError::Invalid(format!(
                    "current version {} of resource {} is not among its versions",
                    current, id
                )));
            }
        }
        Ok(Self {
            id,
            kind: kind.into(),
            current,
            versions,
        })
    }

    /// Make `file` the current version, adding it to the history.
    ///
    /// A version already in the history with the same id is replaced.
    pub fn set_file(&mut self, mut file: StoredFile) {
        file.version_of = Some(self.id);
        file.kind = self.kind.clone();

        let id = file.id;
        match self.versions.iter_mut().find(|v| v.id == id) {
            Some(existing) => *existing = file,
            None => self.versions.push(file),
        }
        self.current = Some(id);
    }

    /// Point `current` at an existing version
    pub fn set_current(&mut self, version: Uuid) -> Result<()> {
        if !self.versions.iter().any(|v| v.id == version) {
            return Err(MetadataError::NotFound(format!(
                "version {} of resource {}",
                version, self.id
            )));
        }
        self.current = Some(version);
        Ok(())
    }

    pub fn current_id(&self) -> Option<Uuid> {
        self.current
    }

    /// The current version
    pub fn file(&self) -> Option<&StoredFile> {
        let current = self.current?;
        self.versions.iter().find(|v| v.id == current)
    }

    pub fn file_mut(&mut self) -> Option<&mut StoredFile> {
        let current = self.current?;
        self.versions.iter_mut().find(|v| v.id == current)
    }

    /// All versions, most recent first
    pub fn all_files(&self) -> Vec<&StoredFile> {
        let mut files: Vec<&StoredFile> = self.versions.iter().collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        files
    }

    pub fn version(&self, id: Uuid) -> Option<&StoredFile> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn version_mut(&mut self, id: Uuid) -> Option<&mut StoredFile> {
        self.versions.iter_mut().find(|v| v.id == id)
    }

    pub fn version_ids(&self) -> Vec<Uuid> {
        self.versions.iter().map(|v| v.id).collect()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Consume the resource, yielding its versions
    pub fn into_versions(self) -> Vec<StoredFile> {
        self.versions
    }
}
