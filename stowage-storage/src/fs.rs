//! Filesystem storage backend
//!
//! Objects live as plain files below a root directory. The caller's name
//! is used verbatim as the object id, so the on-disk layout mirrors the
//! names callers build (e.g. `event/42/papers/7_paper.pdf`).

use crate::backend::{FileResponse, LocalPath, ObjectReader, SendFile, StorageBackend};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use stowage_core::error::{Operation, Result, StorageError};
use stowage_core::{copy_with_checksum, ByteSource, Checksum, PathResolver, DEFAULT_CHUNK_SIZE};
use tracing::{debug, info};

const ALREADY_EXISTS: &str = "A file with this name already exists";

/// Filesystem-based storage backend
#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    resolver: PathResolver,
}

impl FileSystemBackend {
    /// Registered backend name
    pub const NAME: &'static str = "fs";

    /// Create a backend rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let resolver = PathResolver::new(root);
        info!(root = ?resolver.root(), "Opening filesystem storage");
        Self { resolver }
    }

    /// The root directory
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        self.resolver.resolve(key)
    }

    /// Open an existing regular file, refusing directories
    fn open_file(&self, file_id: &str, op: Operation) -> Result<(File, u64)> {
        let path = self.resolve(file_id)?;
        let fail = |e: io::Error| StorageError::operation(op, file_id, e);

        let file = File::open(&path).map_err(fail)?;
        let metadata = file.metadata().map_err(fail)?;
        if metadata.is_dir() {
            return Err(fail(io::Error::new(ErrorKind::Other, "Is a directory")));
        }
        Ok((file, metadata.len()))
    }
}

fn write_new_file(path: &Path, data: &mut ByteSource<'_>) -> io::Result<Checksum> {
    let already_exists = || io::Error::new(ErrorKind::AlreadyExists, ALREADY_EXISTS);

    if path.exists() {
        return Err(already_exists());
    }
    if let Some(parent) = path.parent() {
        if !parent.is_dir() {
            fs::create_dir_all(parent)?;
        }
    }

    // Exclusive create: a concurrent writer that got there first yields AlreadyExists
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => already_exists(),
            _ => e,
        })?;
    let checksum = copy_with_checksum(data, &mut file, DEFAULT_CHUNK_SIZE)?;
    file.flush()?;
    Ok(checksum)
}

impl StorageBackend for FileSystemBackend {
    fn open(&self, file_id: &str) -> Result<ObjectReader> {
        let (file, _) = self.open_file(file_id, Operation::Open)?;
        Ok(Box::new(file))
    }

    fn save(
        &self,
        name: &str,
        _content_type: &str,
        _filename: &str,
        mut data: ByteSource<'_>,
    ) -> Result<(String, Checksum)> {
        let path = self.resolve(name)?;
        let checksum = write_new_file(&path, &mut data)
            .map_err(|e| StorageError::operation(Operation::Save, name, e))?;

        debug!(file_id = %name, %checksum, "Saved file");
        Ok((name.to_string(), checksum))
    }

    fn delete(&self, file_id: &str) -> Result<()> {
        let path = self.resolve(file_id)?;
        fs::remove_file(&path).map_err(|e| StorageError::operation(Operation::Delete, file_id, e))?;

        debug!(file_id = %file_id, "Deleted file");
        Ok(())
    }

    fn get_size(&self, file_id: &str) -> Result<u64> {
        let path = self.resolve(file_id)?;
        let fail = |e: io::Error| StorageError::operation(Operation::GetSize, file_id, e);

        let metadata = fs::metadata(&path).map_err(fail)?;
        if metadata.is_dir() {
            return Err(fail(io::Error::new(ErrorKind::Other, "Is a directory")));
        }
        Ok(metadata.len())
    }

    fn send_file(
        &self,
        file_id: &str,
        content_type: &str,
        filename: &str,
        inline: bool,
    ) -> Result<SendFile> {
        let (file, size) = self.open_file(file_id, Operation::Send)?;
        let response = FileResponse::new(Box::new(file), content_type, filename, inline).with_length(size);
        Ok(SendFile::Stream(response))
    }

    fn get_local_path(&self, file_id: &str) -> Result<LocalPath> {
        Ok(LocalPath::persistent(self.resolve(file_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn backend() -> (TempDir, FileSystemBackend) {
        let dir = TempDir::new().unwrap();
        let backend = FileSystemBackend::new(dir.path());
        (dir, backend)
    }

    fn read_all(backend: &FileSystemBackend, file_id: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        backend.open(file_id).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_save_open() {
        let (_dir, backend) = backend();
        let (file_id, checksum) = backend
            .save("test.txt", "text/plain", "test.txt", ByteSource::from("hello test"))
            .unwrap();

        assert_eq!(file_id, "test.txt");
        assert_eq!(checksum.to_hex(), "7a6d667ea5ed4467c017b2ed6ea07e78");
        assert_eq!(read_all(&backend, &file_id), b"hello test");
        assert_eq!(backend.get_size(&file_id).unwrap(), 10);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let (dir, backend) = backend();
        backend
            .save("event/1/papers/2_a.pdf", "", "a.pdf", ByteSource::from("x"))
            .unwrap();
        assert!(dir.path().join("event/1/papers/2_a.pdf").is_file());
    }

    #[test]
    fn test_save_existing_fails() {
        let (_dir, backend) = backend();
        backend.save("dup", "", "dup", ByteSource::from("first")).unwrap();

        let err = backend.save("dup", "", "dup", ByteSource::from("second")).unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");
        assert_eq!(err.op(), Some(Operation::Save));
        assert_eq!(read_all(&backend, "dup"), b"first");
    }

    #[test]
    fn test_open_directory_fails() {
        let (_dir, backend) = backend();
        backend.save("dir/file", "", "file", ByteSource::from("x")).unwrap();

        let err = backend.open("dir").err().unwrap();
        assert!(err.to_string().starts_with("Could not open \"dir\""), "{err}");
        assert!(backend.get_size("dir").is_err());
    }

    #[test]
    fn test_save_below_existing_file_fails() {
        let (_dir, backend) = backend();
        backend.save("foo", "", "foo", ByteSource::from("x")).unwrap();

        let err = backend.save("foo/bar.txt", "", "bar.txt", ByteSource::from("y")).unwrap_err();
        assert!(err.to_string().starts_with("Could not save \"foo/bar.txt\""), "{err}");
    }

    #[test]
    fn test_delete_missing_fails() {
        let (_dir, backend) = backend();
        let err = backend.delete("missing").unwrap_err();
        assert_eq!(err.op(), Some(Operation::Delete));
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, backend) = backend();
        assert!(backend.open("../x").err().unwrap().is_invalid_path());
        assert!(backend
            .save("../x", "", "x", ByteSource::from("x"))
            .unwrap_err()
            .is_invalid_path());
        assert!(backend.delete("a/../../x").unwrap_err().is_invalid_path());
        assert!(backend.get_local_path("../x").unwrap_err().is_invalid_path());
    }

    #[test]
    fn test_send_file_sets_headers() {
        let (_dir, backend) = backend();
        backend.save("slides.pdf", "application/pdf", "slides.pdf", ByteSource::from("%PDF")).unwrap();

        let response = backend
            .send_file("slides.pdf", "application/pdf", "slides.pdf", false)
            .unwrap()
            .into_stream()
            .unwrap();
        assert_eq!(response.content_length, Some(4));
        assert_eq!(response.disposition.to_string(), "attachment; filename=\"slides.pdf\"");
        assert_eq!(&response.into_bytes().unwrap()[..], b"%PDF");
    }

    #[test]
    fn test_local_path_is_real_file() {
        let (dir, backend) = backend();
        backend.save("a/b", "", "b", ByteSource::from("data")).unwrap();

        let local = backend.get_local_path("a/b").unwrap();
        assert!(!local.is_temporary());
        assert_eq!(local.path(), dir.path().join("a/b"));
        drop(local);
        assert!(dir.path().join("a/b").exists());
    }
}
