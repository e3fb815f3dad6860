//! Storage Checksums Command
//!
//! Computes missing checksums for every stored record.

use super::AppContext;
use crate::output::{self, row_spinner};
use anyhow::{Context, Result};
use console::style;
use stowage_metadata::{ChecksumBackfill, RowOutcome};

/// Backfill configuration
pub struct ChecksumsConfig {
    pub page_size: Option<usize>,
    pub dry_run: bool,
    pub json: bool,
}

/// Run storage-checksums command
pub fn run(ctx: &AppContext, config: ChecksumsConfig) -> Result<()> {
    let registry = ctx.registry()?;
    let store = ctx.records()?;
    let backfill = ChecksumBackfill::new()
        .with_page_size(config.page_size.unwrap_or(ctx.config.metadata.page_size))
        .dry_run(config.dry_run);

    let pb = row_spinner(if config.dry_run { "(dry run)" } else { "" });
    let report = backfill
        .run_with_progress(&store, &registry, |file, outcome| {
            pb.inc(1);
            if outcome == RowOutcome::Failed {
                pb.println(format!(
                    "{} {}/{} ({})",
                    style(output::WARN).yellow(),
                    file.kind,
                    file.id,
                    file.filename
                ));
            }
        })
        .context("Checksum backfill failed")?;
    pb.finish_and_clear();

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.processed == 0 {
        println!("{} All stored records have checksums", style(output::CHECK).green());
        return Ok(());
    }

    for (kind, counts) in &report.by_kind {
        println!(
            "  {:<20} {:>6} processed {:>6} updated {:>6} failed",
            style(kind).cyan(),
            counts.processed,
            counts.updated,
            counts.failed
        );
    }
    println!();

    let verb = if config.dry_run { "Computed" } else { "Updated" };
    println!(
        "{} {} {} of {} checksums",
        style(output::CHECK).green(),
        verb,
        report.updated,
        report.processed
    );
    if report.failed > 0 {
        println!(
            "{} {} objects could not be read; run again once they are available",
            style(output::CROSS).red(),
            report.failed
        );
    }
    Ok(())
}
