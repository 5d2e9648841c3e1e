//! Progress-callback trait for per-item sync events.
//!
//! Inject an [`Arc<dyn SyncProgressCallback>`] via
//! [`crate::config::SyncConfigBuilder::progress_callback`] to receive events
//! as the coordinator works through the catalog. The CLI uses this to drive
//! its progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use guitarworld_sync::{CatalogItem, SyncConfig, SyncProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl SyncProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, position: usize, total: usize, item: &CatalogItem, skipped: bool) {
//!         let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("[{position}/{total}] {} ({done} done, skipped={skipped})", item.name);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//! let config = SyncConfig::builder()
//!     .progress_callback(cb as Arc<dyn SyncProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::catalog::CatalogItem;
use crate::error::SheetError;
use crate::output::SyncSummary;
use std::sync::Arc;

/// Called by the pipeline coordinator as it processes each catalog item.
///
/// Items are processed concurrently, so every method may be called from
/// several tasks at once. Implementations must synchronise their own state.
/// All methods default to no-ops.
pub trait SyncProgressCallback: Send + Sync {
    /// Called once, before the first item is admitted.
    fn on_sync_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called when an item obtains a worker slot.
    ///
    /// `position` is 1-indexed in catalog order.
    fn on_item_start(&self, position: usize, total: usize, item: &CatalogItem) {
        let _ = (position, total, item);
    }

    /// Called when an item produced its PDF or was skipped because the file
    /// already existed.
    fn on_item_complete(&self, position: usize, total: usize, item: &CatalogItem, skipped: bool) {
        let _ = (position, total, item, skipped);
    }

    /// Called when an item failed.
    fn on_item_error(&self, position: usize, total: usize, item: &CatalogItem, error: &SheetError) {
        let _ = (position, total, item, error);
    }

    /// Called once after every item has an outcome.
    fn on_sync_complete(&self, summary: &SyncSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SyncProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SyncConfig`].
pub type ProgressCallback = Arc<dyn SyncProgressCallback>;
