//! Record Commands
//!
//! Stores files through the record lifecycle and inspects the record
//! database.

use super::AppContext;
use crate::output::{self, format_bytes, transfer_bar, truncate_left};
use anyhow::{Context, Result};
use console::style;
use std::fs::File;
use std::path::PathBuf;
use stowage_core::ByteSource;
use stowage_metadata::{DefaultPathBuilder, FileState, RecordStore, StoredFile, VersionedResource};
use uuid::Uuid;

/// Attach configuration
pub struct AttachConfig {
    pub path: PathBuf,
    pub kind: String,
    pub backend: Option<String>,
    pub prefix: Option<String>,
    pub content_type: Option<String>,
    /// Add as a new version of this resource
    pub resource: Option<Uuid>,
    /// Create a new versioned resource for the file
    pub versioned: bool,
}

/// Store a local file as a new record
pub fn attach(ctx: &AppContext, config: AttachConfig) -> Result<()> {
    let registry = ctx.registry()?;
    let store = ctx.records()?;

    let mut resource = match (config.resource, config.versioned) {
        (Some(id), _) => Some(
            store
                .get_resource(id)?
                .with_context(|| format!("Resource not found: {}", id))?,
        ),
        (None, true) => Some(VersionedResource::new(&config.kind)),
        (None, false) => None,
    };
    let kind = resource.as_ref().map(|r| r.kind.clone()).unwrap_or(config.kind);

    let source = File::open(&config.path).with_context(|| format!("Failed to open {}", config.path.display()))?;
    let size = source.metadata()?.len();
    let filename = config
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();
    let content_type = config.content_type.unwrap_or_else(|| {
        mime_guess::from_path(&config.path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });

    let mut paths = DefaultPathBuilder::new(ctx.backend_name(config.backend.as_deref()));
    if let Some(prefix) = config.prefix {
        paths = paths.with_prefix(prefix);
    }

    let mut file = StoredFile::new(kind, filename.clone(), content_type);
    let pb = transfer_bar(size, format!("Storing {}", filename));
    let saved = file.save(&registry, &paths, ByteSource::reader(pb.wrap_read(source)));
    pb.finish_and_clear();
    saved.context("Failed to store file")?;

    let record_id = file.id;
    let persisted = match resource.as_mut() {
        Some(resource) => {
            resource.set_file(file.clone());
            store.put_resource(resource)
        }
        None => store.put_file(&file),
    };
    if let Err(e) = persisted {
        if let Err(cleanup) = file.delete(&registry) {
            tracing::warn!(id = %record_id, error = %cleanup, "Could not remove orphaned object");
        }
        return Err(e).context("Failed to save record");
    }

    println!(
        "{} Attached {} as {} record {}",
        style(output::CHECK).green(),
        filename,
        file.kind,
        style(record_id).bold()
    );
    if let Some(resource) = &resource {
        println!("  Resource: {} ({} versions)", resource.id, resource.len());
    }
    println!(
        "  Object:   {}:{}",
        file.storage_backend().unwrap_or_default(),
        file.storage_file_id().unwrap_or_default()
    );
    if let Some(checksum) = file.checksum() {
        println!("  Checksum: {}", checksum);
    }
    Ok(())
}

/// List records, optionally of a single kind
pub fn list(ctx: &AppContext, kind: Option<String>) -> Result<()> {
    let store = ctx.records()?;
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => store.kinds()?,
    };

    if kinds.is_empty() {
        println!("{} No records found", style("Info:").cyan());
        return Ok(());
    }

    println!(
        "{:<36} {:<16} {:>10} {:<8} {}",
        style("ID").bold(),
        style("KIND").bold(),
        style("SIZE").bold(),
        style("CHECKSUM").bold(),
        style("FILENAME").bold()
    );
    println!("{}", "-".repeat(100));

    let mut count = 0;
    for kind in &kinds {
        for file in store.list_files(kind)? {
            count += 1;
            let size = file.size().map(format_bytes).unwrap_or_else(|| "-".to_string());
            let checksum = match (file.state(), file.checksum()) {
                (FileState::Empty, _) => "empty".to_string(),
                (FileState::Bound, Some(checksum)) => checksum.to_hex()[..8].to_string(),
                (FileState::Bound, None) => "missing".to_string(),
            };
            println!(
                "{:<36} {:<16} {:>10} {:<8} {}",
                file.id,
                truncate_left(kind, 16),
                size,
                checksum,
                file.filename
            );
        }
    }

    println!("{}", "-".repeat(100));
    println!("{} records", style(count).green());
    Ok(())
}

/// Show a single record
pub fn show(ctx: &AppContext, kind: &str, id: Uuid, json: bool) -> Result<()> {
    let store = ctx.records()?;
    let file = store
        .get_file(kind, id)?
        .with_context(|| format!("Record not found: {}/{}", kind, id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&file)?);
        return Ok(());
    }

    println!("{}", style(format!("{} {}", file.kind, file.id)).bold());
    println!("  Filename:     {}", file.filename);
    println!("  Content type: {}", file.content_type);
    println!("  Created:      {}", file.created_at.to_rfc3339());
    match file.state() {
        FileState::Bound => {
            println!(
                "  Object:       {}:{}",
                file.storage_backend().unwrap_or_default(),
                file.storage_file_id().unwrap_or_default()
            );
            if let Some(size) = file.size() {
                println!("  Size:         {} ({} bytes)", format_bytes(size), size);
            }
        }
        FileState::Empty => println!("  Object:       {}", style("(none)").dim()),
    }
    match file.checksum() {
        Some(checksum) => println!("  Checksum:     {}", checksum),
        None => println!("  Checksum:     {}", style("(not computed)").yellow()),
    }
    if let Some(resource) = file.version_of {
        println!("  Version of:   {}", resource);
    }
    Ok(())
}

/// Show a versioned resource with its history
pub fn resource(ctx: &AppContext, id: Uuid) -> Result<()> {
    let store = ctx.records()?;
    let resource = store
        .get_resource(id)?
        .with_context(|| format!("Resource not found: {}", id))?;

    println!("{}", style(format!("{} resource {}", resource.kind, resource.id)).bold());
    for file in resource.all_files() {
        let marker = if Some(file.id) == resource.current_id() {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "  {} {} {:<24} {}",
            marker,
            file.id,
            file.created_at.format("%Y-%m-%d %H:%M:%S"),
            file.filename
        );
    }
    Ok(())
}

/// Delete the stored object of a record, keeping the record
pub fn detach(ctx: &AppContext, kind: &str, id: Uuid, force: bool) -> Result<()> {
    let registry = ctx.registry()?;
    let store = ctx.records()?;
    let mut file = store
        .get_file(kind, id)?
        .with_context(|| format!("Record not found: {}/{}", kind, id))?;

    if !force {
        println!(
            "{} About to delete the stored object of {}/{} ({})",
            style("Warning:").yellow(),
            kind,
            id,
            file.filename
        );
        println!("\nUse --force to delete without confirmation.");
        return Ok(());
    }

    file.delete(&registry).context("Failed to delete stored object")?;
    store.put_file(&file)?;
    println!("{} Detached {}/{}", style(output::CHECK).green(), kind, id);
    Ok(())
}
