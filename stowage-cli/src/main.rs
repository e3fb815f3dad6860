//! Stowage CLI
//!
//! Command-line tool for pluggable file storage.
//!
//! # Commands
//! - `backends` - List backend implementations and configured backends
//! - `put` / `get` / `stat` / `rm` - Raw object access on a backend
//! - `attach` - Store a file through the record lifecycle
//! - `records` - Inspect and detach stored records
//! - `storage-checksums` - Compute missing checksums of stored records
//! - `config` - Show or initialize configuration
//!
//! # Configuration
//! Config file: ~/.stowage/config.toml (or `--config` / `STOWAGE_CONFIG`)

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;
mod config;
mod output;

use commands::{backends, checksums, objects, records, AppContext};

#[derive(Parser)]
#[command(name = "stowage")]
#[command(about = "Pluggable file storage tool")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "STOWAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List backend implementations and configured backends
    Backends,

    /// Store a local file as a new object
    Put {
        /// Path to the local file
        path: PathBuf,

        /// Configured backend to store into
        #[arg(short, long)]
        backend: Option<String>,

        /// Logical object name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// MIME type (guessed from the file name if omitted)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Write an object to a local file or stdout
    Get {
        /// Object id
        file_id: String,

        #[arg(short, long)]
        backend: Option<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show size and checksum of an object
    Stat {
        file_id: String,

        #[arg(short, long)]
        backend: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an object
    Rm {
        file_id: String,

        #[arg(short, long)]
        backend: Option<String>,

        /// Delete without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Store a local file as a new record
    Attach {
        path: PathBuf,

        /// Record kind
        #[arg(short, long, default_value = "attachment")]
        kind: String,

        #[arg(short, long)]
        backend: Option<String>,

        /// Prefix of the generated object name
        #[arg(short, long)]
        prefix: Option<String>,

        #[arg(long)]
        content_type: Option<String>,

        /// Add as a new version of an existing resource
        #[arg(long, conflicts_with = "versioned")]
        resource: Option<Uuid>,

        /// Create a new versioned resource for the file
        #[arg(long)]
        versioned: bool,
    },

    /// Inspect stored records
    Records {
        #[command(subcommand)]
        command: RecordCommands,
    },

    /// Compute missing checksums of stored records
    StorageChecksums {
        /// Rows committed together
        #[arg(long)]
        page_size: Option<usize>,

        /// Compute without writing checksums back
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum RecordCommands {
    /// List records
    List {
        /// Only records of this kind
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Show a single record
    Show {
        kind: String,
        id: Uuid,

        #[arg(long)]
        json: bool,
    },

    /// Show a versioned resource and its history
    Resource { id: Uuid },

    /// Delete the stored object of a record, keeping the record
    Detach {
        kind: String,
        id: Uuid,

        /// Delete without confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = config::config_file_path(cli.config.as_deref());

    let load = || -> Result<AppContext> { Ok(AppContext::new(config::load_config(&config_path)?)) };

    match cli.command {
        Commands::Config { command } => handle_config_command(command, &config_path)?,

        Commands::Backends => backends::run(&load()?)?,

        Commands::Put {
            path,
            backend,
            name,
            content_type,
        } => {
            let config = objects::PutConfig {
                path,
                backend,
                name,
                content_type,
            };
            objects::put(&load()?, config)?;
        }

        Commands::Get {
            file_id,
            backend,
            output,
        } => {
            let config = objects::GetConfig {
                file_id,
                backend,
                output,
            };
            objects::get(&load()?, config)?;
        }

        Commands::Stat { file_id, backend, json } => {
            let config = objects::StatConfig { file_id, backend, json };
            objects::stat(&load()?, config)?;
        }

        Commands::Rm { file_id, backend, force } => {
            let config = objects::RemoveConfig { file_id, backend, force };
            objects::remove(&load()?, config)?;
        }

        Commands::Attach {
            path,
            kind,
            backend,
            prefix,
            content_type,
            resource,
            versioned,
        } => {
            let config = records::AttachConfig {
                path,
                kind,
                backend,
                prefix,
                content_type,
                resource,
                versioned,
            };
            records::attach(&load()?, config)?;
        }

        Commands::Records { command } => {
            let ctx = load()?;
            match command {
                RecordCommands::List { kind } => records::list(&ctx, kind)?,
                RecordCommands::Show { kind, id, json } => records::show(&ctx, &kind, id, json)?,
                RecordCommands::Resource { id } => records::resource(&ctx, id)?,
                RecordCommands::Detach { kind, id, force } => records::detach(&ctx, &kind, id, force)?,
            }
        }

        Commands::StorageChecksums {
            page_size,
            dry_run,
            json,
        } => {
            let config = checksums::ChecksumsConfig {
                page_size,
                dry_run,
                json,
            };
            checksums::run(&load()?, config)?;
        }
    }

    Ok(())
}

/// Handle config subcommands
fn handle_config_command(command: Option<ConfigCommands>, path: &std::path::Path) -> Result<()> {
    use console::style;

    match command {
        None | Some(ConfigCommands::Show) => {
            let cfg = config::load_config(path)?;
            println!();
            println!("{}", style("Stowage Configuration").bold().underlined());
            println!();
            println!("{}", style("[storage]").cyan());
            println!("  default_backend = \"{}\"", cfg.storage.default_backend);
            println!("  temp_dir = \"{}\"", cfg.storage.temp_dir.display());
            println!();
            println!("{}", style("[storage.backends]").cyan());
            for (name, definition) in &cfg.storage.backends {
                println!("  {} = \"{}\"", name, definition);
            }
            println!();
            println!("{}", style("[metadata]").cyan());
            println!("  path = \"{}\"", cfg.metadata.path.display());
            println!("  page_size = {}", cfg.metadata.page_size);
            println!();

            println!("{} {}", style("Config file:").dim(), path.display());
            if !path.exists() {
                println!(
                    "{} Run '{}' to create it",
                    style("(not created yet)").yellow(),
                    style("stowage config init").green()
                );
            }
        }

        Some(ConfigCommands::Path) => {
            println!("{}", path.display());
        }

        Some(ConfigCommands::Init { force }) => {
            if path.exists() && !force {
                println!(
                    "{} Config file already exists at {}",
                    style(output::WARN).yellow(),
                    path.display()
                );
                println!("Use --force to overwrite");
                return Ok(());
            }

            config::save_config(path, &config::StowageConfig::default().with_fallback_backend())?;
            println!(
                "{} Config file created at {}",
                style(output::CHECK).green(),
                path.display()
            );
        }
    }

    Ok(())
}
