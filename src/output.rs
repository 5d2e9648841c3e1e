//! Result types produced by a sync run.
//!
//! Every catalog item yields exactly one [`ProcessOutcome`]; the coordinator
//! folds them into a [`SyncSummary`].

use crate::catalog::CatalogItem;
use crate::error::{FailureKind, SheetError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What happened to one catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// A new PDF with `pages` pages was written.
    Created { pages: usize },
    /// The PDF already existed; nothing was fetched.
    Skipped,
    /// The item failed; no file was written.
    Failed { error: SheetError },
}

/// The outcome of processing one catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub item: CatalogItem,
    /// 1-indexed position in catalog order.
    pub position: usize,
    /// Target PDF path (derived even when the item failed).
    pub path: PathBuf,
    pub status: ItemStatus,
    pub duration_ms: u64,
}

impl ProcessOutcome {
    /// `true` for created and skipped items.
    pub fn is_success(&self) -> bool {
        !matches!(self.status, ItemStatus::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, ItemStatus::Skipped)
    }

    pub fn error(&self) -> Option<&SheetError> {
        match &self.status {
            ItemStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Aggregate statistics for a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Items submitted to the coordinator.
    pub total: usize,
    /// New PDFs written.
    pub created: usize,
    /// Items whose PDF already existed.
    pub skipped: usize,
    pub failed: usize,
    /// Pages embedded across all created PDFs.
    pub pages: usize,
    /// Outcomes of the failed items, in completion order.
    pub failures: Vec<ProcessOutcome>,
    pub duration_ms: u64,
}

impl SyncSummary {
    /// Fold one outcome into the tallies.
    pub fn record(&mut self, outcome: ProcessOutcome) {
        match &outcome.status {
            ItemStatus::Created { pages } => {
                self.created += 1;
                self.pages += pages;
            }
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Failed { .. } => {
                self.failed += 1;
                self.failures.push(outcome);
            }
        }
    }

    /// Number of outcomes recorded so far.
    pub fn processed(&self) -> usize {
        self.created + self.skipped + self.failed
    }

    /// Failure counts grouped by kind.
    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for e in self.failures.iter().filter_map(ProcessOutcome::error) {
            *counts.entry(e.kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// One catalog entry as reported by a listing-only run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item: CatalogItem,
    /// Where the item's PDF lives (or would be written).
    pub path: PathBuf,
    /// Whether that PDF is already on disk.
    pub exists: bool,
}
