//! Checksum backfill
//!
//! Computes checksums for bound records that were stored without one.
//! Rows are read in pages ordered by record id and each page is committed
//! before the next is fetched. A row whose object cannot be read is logged
//! and skipped; it stays without a checksum and is picked up again by the
//! next run.

use crate::file::StoredFile;
use crate::store::RecordStore;
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use stowage_core::{compute_checksum, Checksum, Operation, StorageError};
use stowage_storage::BackendRegistry;
use tracing::{debug, info, warn};

/// Default number of rows committed together
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Result of processing a single row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Updated(Checksum),
    Failed,
}

/// Counters for one record kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Summary of a backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
    pub by_kind: BTreeMap<String, KindReport>,
}

impl BackfillReport {
    fn record(&mut self, kind: &str, outcome: RowOutcome) {
        let entry = self.by_kind.entry(kind.to_string()).or_default();
        self.processed += 1;
        entry.processed += 1;
        match outcome {
            RowOutcome::Updated(_) => {
                self.updated += 1;
                entry.updated += 1;
            }
            RowOutcome::Failed => {
                self.failed += 1;
                entry.failed += 1;
            }
        }
    }
}

/// Batch job filling in missing checksums
#[derive(Debug, Clone)]
pub struct ChecksumBackfill {
    page_size: usize,
    dry_run: bool,
}

impl Default for ChecksumBackfill {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumBackfill {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            dry_run: false,
        }
    }

    /// Set the number of rows per committed page (at least 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Compute checksums without writing them back
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run over every kind in `store`
    pub fn run(&self, store: &dyn RecordStore, registry: &BackendRegistry) -> Result<BackfillReport> {
        self.run_with_progress(store, registry, |_, _| {})
    }

    /// Run over every kind in `store`, reporting each processed row
    pub fn run_with_progress<F>(
        &self,
        store: &dyn RecordStore,
        registry: &BackendRegistry,
        mut progress: F,
    ) -> Result<BackfillReport>
    where
        F: FnMut(&StoredFile, RowOutcome),
    {
        let mut report = BackfillReport::default();

        for kind in store.kinds()? {
            let mut cursor = None;
            loop {
                let page = store.files_missing_checksum(&kind, cursor, self.page_size)?;
                let Some(last) = page.last() else {
                    break;
                };
                cursor = Some(last.id);

                let mut updates = Vec::with_capacity(page.len());
                for file in &page {
                    let outcome = match checksum_of(file, registry) {
                        Ok(checksum) => {
                            updates.push((file.id, checksum));
                            RowOutcome::Updated(checksum)
                        }
                        Err(e) => {
                            warn!(id = %file.id, kind = %kind, error = %e, "Could not compute checksum");
                            RowOutcome::Failed
                        }
                    };
                    report.record(&kind, outcome);
                    progress(file, outcome);
                }

                if !self.dry_run && !updates.is_empty() {
                    store.update_checksums(&kind, &updates)?;
                }
                debug!(kind = %kind, rows = page.len(), updated = updates.len(), "Processed page");

                if page.len() < self.page_size {
                    break;
                }
            }
        }

        info!(
            processed = report.processed,
            updated = report.updated,
            failed = report.failed,
            dry_run = self.dry_run,
            "Checksum backfill finished"
        );
        Ok(report)
    }
}

fn checksum_of(file: &StoredFile, registry: &BackendRegistry) -> Result<Checksum> {
    let mut reader = file.open(registry)?;
    let checksum = compute_checksum(&mut reader)
        .map_err(|e| StorageError::operation(Operation::Open, file.storage_file_id().unwrap_or_default(), e))?;
    Ok(checksum)
}
