//! Top-level sync API.
//!
//! [`sync`] is the whole program: validate credentials, read the catalog,
//! process every item, return the tally. [`sync_with`] and [`sync_items`]
//! expose the same flow with injected collaborators, which is how the
//! integration tests drive it without a network.

use crate::catalog::{fetch_catalog, CatalogItem, CatalogSource};
use crate::client::GuitarWorldClient;
use crate::config::{SyncConfig, COOKIES_ENV};
use crate::error::SyncError;
use crate::output::{CatalogEntry, SyncSummary};
use crate::pipeline::fetch::ItemFetcher;
use crate::pipeline::process::SheetProcessor;
use crate::stream::sync_stream;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Sync the purchased catalog into `config.output_dir`.
///
/// Fatal errors (missing cookies, unusable output directory, a catalog page
/// that cannot be read) abort before any item is processed. Per-item
/// failures never abort the run; they are counted in the returned summary.
///
/// # Example
/// ```rust,no_run
/// use guitarworld_sync::{sync, SyncConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SyncConfig::builder()
///     .cookies(std::env::var("GUITARWORLD_COOKIES")?)
///     .output_dir("./pdfs")
///     .build()?;
/// let summary = sync(&config).await?;
/// println!("{} created, {} skipped, {} failed", summary.created, summary.skipped, summary.failed);
/// # Ok(())
/// # }
/// ```
pub async fn sync(config: &SyncConfig) -> Result<SyncSummary, SyncError> {
    let client = Arc::new(live_client(config)?);
    sync_with(client.as_ref(), client.clone(), config).await
}

/// Read the catalog and report where each item's PDF lives, without
/// downloading anything.
pub async fn list_catalog(config: &SyncConfig) -> Result<Vec<CatalogEntry>, SyncError> {
    let client = Arc::new(live_client(config)?);
    let items = fetch_catalog(client.as_ref(), config.listing_pacing()).await?;
    let processor = SheetProcessor::new(client, config);

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let path = processor.output_path(&item);
        let exists = matches!(tokio::fs::try_exists(&path).await, Ok(true));
        entries.push(CatalogEntry { item, path, exists });
    }
    Ok(entries)
}

/// [`sync`] with caller-supplied catalog and item collaborators.
pub async fn sync_with(
    source: &dyn CatalogSource,
    fetcher: Arc<dyn ItemFetcher>,
    config: &SyncConfig,
) -> Result<SyncSummary, SyncError> {
    prepare_output_dir(&config.output_dir).await?;

    info!("Fetching purchased catalog...");
    let items = fetch_catalog(source, config.listing_pacing()).await?;
    info!("Found {} sheet music items", items.len());

    let processor = Arc::new(SheetProcessor::new(fetcher, config));
    Ok(sync_items(items, processor, config).await)
}

/// Process an already-fetched list of items and fold the outcomes.
///
/// Returns once every item has an outcome; `summary.processed()` always
/// equals `items.len()`.
pub async fn sync_items(
    items: Vec<CatalogItem>,
    processor: Arc<SheetProcessor>,
    config: &SyncConfig,
) -> SyncSummary {
    let start = Instant::now();
    let total = items.len();
    if let Some(cb) = &config.progress_callback {
        cb.on_sync_start(total);
    }

    let mut summary = SyncSummary {
        total,
        ..SyncSummary::default()
    };

    let mut outcomes = sync_stream(items, processor, config);
    while let Some(outcome) = outcomes.next().await {
        if let Some(e) = outcome.error() {
            warn!(
                "[{}/{}] Failed: {} (ID: {}): {}",
                outcome.position,
                total,
                outcome.item.display_title(),
                outcome.item.id,
                e
            );
        }
        summary.record(outcome);
    }
    summary.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Sync complete: {} items, {} created, {} skipped, {} failed ({}ms)",
        summary.total, summary.created, summary.skipped, summary.failed, summary.duration_ms
    );

    if let Some(cb) = &config.progress_callback {
        cb.on_sync_complete(&summary);
    }
    summary
}

fn live_client(config: &SyncConfig) -> Result<GuitarWorldClient, SyncError> {
    let cookies = config
        .cookies
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| SyncError::MissingCredentials {
            var: COOKIES_ENV.to_string(),
        })?;
    GuitarWorldClient::new(cookies, config)
}

async fn prepare_output_dir(dir: &Path) -> Result<(), SyncError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SyncError::OutputDir {
            path: dir.to_path_buf(),
            source,
        })
}
