//! End-to-end lifecycle tests
//!
//! Tests the record pipeline: upload → save → persist → open/send → delete,
//! versioned resources and the checksum backfill against both record stores.
//!
//! Run with: cargo test --package stowage-metadata --test lifecycle

use std::io::Read;
use stowage_core::Checksum;
use stowage_metadata::{
    ChecksumBackfill, DefaultPathBuilder, FileState, MemoryRecordStore, MetadataError, RecordStore,
    SledRecordStore, StoredFile, VersionedResource,
};
use stowage_storage::{BackendRegistry, SendFile, StorageConfig};
use tempfile::TempDir;

/// Generate test file data of specified size
fn generate_file(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn registry(dir: &TempDir) -> BackendRegistry {
    let root = dir.path().display().to_string();
    let config = StorageConfig::new()
        .with_backend("default", format!("fs:{}", root))
        .with_backend("archive", format!("fs-readonly:{}", root))
        .with_backend("scratch", "memory:capacity=16777216")
        .with_temp_dir(dir.path());
    let registry = BackendRegistry::new(&config).unwrap();
    registry.validate().unwrap();
    registry
}

fn read_record(file: &StoredFile, registry: &BackendRegistry) -> Vec<u8> {
    let mut buf = Vec::new();
    file.open(registry).unwrap().read_to_end(&mut buf).unwrap();
    buf
}

fn run_lifecycle(store: &dyn RecordStore, registry: &BackendRegistry, backend: &str) {
    let data = generate_file(1024 * 1024 + 3);
    let mut file = StoredFile::new("attachment", "minutes 2024.pdf", "application/pdf");
    file.save(registry, &DefaultPathBuilder::new(backend).with_prefix("event/7"), data.clone())
        .unwrap();
    store.put_file(&file).unwrap();

    let loaded = store.get_file("attachment", file.id).unwrap().unwrap();
    assert_eq!(loaded.state(), FileState::Bound);
    assert_eq!(loaded.size(), Some(data.len() as u64));
    assert_eq!(loaded.checksum(), Some(Checksum::compute(&data)));
    assert_eq!(read_record(&loaded, registry), data);

    match loaded.send(registry, true).unwrap() {
        SendFile::Stream(response) => {
            assert_eq!(response.content_length, Some(data.len() as u64));
            assert!(response.disposition.to_string().starts_with("inline"));
        }
        SendFile::Redirect { .. } => panic!("local backends stream"),
    }

    let seen = loaded
        .get_local_path(registry)
        .map(|local| std::fs::read(local.path()).unwrap())
        .unwrap();
    assert_eq!(seen, data);

    let mut deleted = loaded;
    deleted.delete(registry).unwrap();
    store.put_file(&deleted).unwrap();
    let reloaded = store.get_file("attachment", file.id).unwrap().unwrap();
    assert_eq!(reloaded.state(), FileState::Empty);
    assert!(matches!(reloaded.open(registry), Err(MetadataError::NoFile(_))));
    assert!(matches!(file.open(registry), Err(MetadataError::Storage(_))));
}

#[test]
fn test_lifecycle_filesystem_sled() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    let store = SledRecordStore::open_temporary().unwrap();
    run_lifecycle(&store, &registry, "default");
}

#[test]
fn test_lifecycle_memory_backend() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    let store = MemoryRecordStore::new();
    run_lifecycle(&store, &registry, "scratch");
}

#[test]
fn test_read_only_backend_rejects_upload() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    let mut file = StoredFile::new("attachment", "x.txt", "text/plain");

    let err = file
        .save(&registry, &DefaultPathBuilder::new("archive"), &b"x"[..])
        .unwrap_err();
    match err {
        MetadataError::Storage(e) => assert!(e.is_read_only()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(file.state(), FileState::Empty);
}

#[test]
fn test_versioned_resource_persisted() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    let store = SledRecordStore::open_temporary().unwrap();
    let paths = DefaultPathBuilder::new("default");

    let mut resource = VersionedResource::new("paper_revision");
    for (i, content) in ["draft", "review", "final"].iter().enumerate() {
        let mut version = StoredFile::new("paper_revision", format!("paper-v{}.txt", i + 1), "text/plain")
            .with_created_at(chrono::Utc::now() + chrono::Duration::seconds(i as i64));
        version.save(&registry, &paths, content.as_bytes()).unwrap();
        resource.set_file(version);
    }
    store.put_resource(&resource).unwrap();

    let loaded = store.get_resource(resource.id).unwrap().unwrap();
    assert_eq!(read_record(loaded.file().unwrap(), &registry), b"final");
    let names: Vec<&str> = loaded.all_files().iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, vec!["paper-v3.txt", "paper-v2.txt", "paper-v1.txt"]);

    assert!(store.delete_resource(resource.id).unwrap());
    assert!(store.list_files("paper_revision").unwrap().is_empty());
}

#[test]
fn test_backfill_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let registry = registry(&dir);
    let store = SledRecordStore::open_temporary().unwrap();

    for i in 0..12 {
        let name = format!("legacy/{}.bin", i);
        let path = dir.path().join(&name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, generate_file(i * 100)).unwrap();

        let mut file = StoredFile::new("attachment", format!("{}.bin", i), "");
        file.bind_existing("default", name, (i * 100) as u64).unwrap();
        store.put_file(&file).unwrap();
    }

    let first = ChecksumBackfill::new().with_page_size(5).run(&store, &registry).unwrap();
    assert_eq!(first.processed, 12);
    assert_eq!(first.updated, 12);

    let after_first = store.list_files("attachment").unwrap();
    for file in &after_first {
        assert_eq!(file.checksum(), Some(Checksum::compute(&read_record(file, &registry))));
    }

    let second = ChecksumBackfill::new().with_page_size(5).run(&store, &registry).unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(store.list_files("attachment").unwrap(), after_first);
}
