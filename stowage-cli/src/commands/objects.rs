//! Object Commands
//!
//! Raw object access against a configured backend: put, get, stat and rm.

use super::AppContext;
use crate::output::{self, format_bytes, transfer_bar};
use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use stowage_core::{compute_checksum, copy_with_checksum, ByteSource, DEFAULT_CHUNK_SIZE};

/// Put configuration
pub struct PutConfig {
    pub path: PathBuf,
    pub backend: Option<String>,
    pub name: Option<String>,
    pub content_type: Option<String>,
}

/// Get configuration
pub struct GetConfig {
    pub file_id: String,
    pub backend: Option<String>,
    pub output: Option<PathBuf>,
}

/// Stat configuration
pub struct StatConfig {
    pub file_id: String,
    pub backend: Option<String>,
    pub json: bool,
}

/// Remove configuration
pub struct RemoveConfig {
    pub file_id: String,
    pub backend: Option<String>,
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct ObjectInfo {
    backend: String,
    file_id: String,
    size: u64,
    checksum: String,
    local_path: Option<PathBuf>,
}

/// Store a local file as a new object
pub fn put(ctx: &AppContext, config: PutConfig) -> Result<()> {
    let registry = ctx.registry()?;
    let backend_name = ctx.backend_name(config.backend.as_deref());
    let storage = registry.get_storage(backend_name)?;

    let file = File::open(&config.path).with_context(|| format!("Failed to open {}", config.path.display()))?;
    let size = file.metadata()?.len();
    let filename = config
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();
    let name = config.name.unwrap_or_else(|| filename.clone());
    let content_type = config.content_type.unwrap_or_else(|| {
        mime_guess::from_path(&config.path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });

    let pb = transfer_bar(size, format!("Storing {}", filename));
    let result = storage.save(&name, &content_type, &filename, ByteSource::reader(pb.wrap_read(file)));
    pb.finish_and_clear();
    let (file_id, checksum) = result.context("Failed to store object")?;
    let stored = storage.get_size(&file_id)?;

    println!(
        "{} Stored {} in {}",
        style(output::CHECK).green(),
        style(&file_id).bold(),
        backend_name
    );
    println!("  Size:     {} ({} bytes)", format_bytes(stored), stored);
    println!("  Checksum: {}", checksum);
    Ok(())
}

/// Copy an object to a local file or stdout
pub fn get(ctx: &AppContext, config: GetConfig) -> Result<()> {
    let registry = ctx.registry()?;
    let storage = registry.get_storage(ctx.backend_name(config.backend.as_deref()))?;
    let mut reader = storage.open(&config.file_id)?;

    match config.output {
        Some(path) => {
            let size = storage.get_size(&config.file_id)?;
            let mut out = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
            let pb = transfer_bar(size, format!("Fetching {}", config.file_id));
            let result = copy_with_checksum(&mut pb.wrap_read(reader), &mut out, DEFAULT_CHUNK_SIZE);
            pb.finish_and_clear();
            let checksum = result.context("Failed to copy object")?;
            out.flush()?;

            println!(
                "{} Saved {} to {} ({})",
                style(output::CHECK).green(),
                config.file_id,
                path.display(),
                checksum
            );
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            copy_with_checksum(&mut reader, &mut lock, DEFAULT_CHUNK_SIZE).context("Failed to copy object")?;
            lock.flush()?;
        }
    }
    Ok(())
}

fn object_info(ctx: &AppContext, file_id: &str, backend: Option<&str>) -> Result<ObjectInfo> {
    let registry = ctx.registry()?;
    let backend_name = ctx.backend_name(backend);
    let storage = registry.get_storage(backend_name)?;

    let size = storage.get_size(file_id)?;
    let checksum = compute_checksum(&mut storage.open(file_id)?).context("Failed to read object")?;
    let local = storage.get_local_path(file_id)?;
    let local_path = (!local.is_temporary()).then(|| local.path().to_path_buf());

    Ok(ObjectInfo {
        backend: backend_name.to_string(),
        file_id: file_id.to_string(),
        size,
        checksum: checksum.to_hex(),
        local_path,
    })
}

/// Show size and checksum of an object
pub fn stat(ctx: &AppContext, config: StatConfig) -> Result<()> {
    let info = object_info(ctx, &config.file_id, config.backend.as_deref())?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", style(&info.file_id).bold());
    println!("  Backend:  {}", info.backend);
    println!("  Size:     {} ({} bytes)", format_bytes(info.size), info.size);
    println!("  Checksum: {}", info.checksum);
    if let Some(path) = &info.local_path {
        println!("  Path:     {}", path.display());
    }
    Ok(())
}

/// Delete an object
pub fn remove(ctx: &AppContext, config: RemoveConfig) -> Result<()> {
    let registry = ctx.registry()?;
    let backend_name = ctx.backend_name(config.backend.as_deref());
    let storage = registry.get_storage(backend_name)?;
    let size = storage.get_size(&config.file_id)?;

    if !config.force {
        println!(
            "{} About to delete: {}/{}",
            style("Warning:").yellow(),
            backend_name,
            config.file_id
        );
        println!("  Size: {} bytes", size);
        println!("\nUse --force to delete without confirmation.");
        return Ok(());
    }

    if let Err(e) = storage.delete(&config.file_id) {
        if e.is_read_only() {
            anyhow::bail!("Backend '{}' is read-only", backend_name);
        }
        return Err(e).context("Failed to delete object");
    }

    println!(
        "{} Deleted: {}/{}",
        style(output::CHECK).green(),
        backend_name,
        config.file_id
    );
    Ok(())
}
