//! # guitarworld-sync
//!
//! Mirror the sheet music you purchased on Guitar World (吉他世界) into a
//! local library of PDFs, one document per score.
//!
//! The site only shows purchased scores as page images inside a logged-in
//! web view. This crate reads your catalog through the same endpoints the
//! site's front end uses, downloads every page image and lays them out on
//! A4 pages. Re-running is cheap: a score whose PDF already exists is
//! skipped without touching the network.
//!
//! ## Pipeline Overview
//!
//! ```text
//! cookies
//!  │
//!  ├─ 1. Catalog   page through the purchased list (JSON API)
//!  ├─ 2. Dispatch  semaphore-bounded workers, paced admissions
//!  │    per item:
//!  │    ├─ Path      <out>/<creator>/[<category>] <title> - <subtitle>.pdf
//!  │    ├─ Skip      file exists → done
//!  │    ├─ Resolve   scrape image URLs from the detail page
//!  │    ├─ Download  sequential, in page order
//!  │    └─ Assemble  one image per A4 page, atomic write (spawn_blocking)
//!  └─ 3. Summary   created / skipped / failed tallies
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guitarworld_sync::{sync, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Copy the Cookie header from a logged-in browser session.
//!     let config = SyncConfig::builder()
//!         .cookies(std::env::var("GUITARWORLD_COOKIES")?)
//!         .output_dir("./pdfs")
//!         .concurrency(3)
//!         .build()?;
//!     let summary = sync(&config).await?;
//!     eprintln!("{} new, {} already synced, {} failed",
//!         summary.created, summary.skipped, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `guitarworld-sync` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! guitarworld-sync = { version = "0.1", default-features = false }
//! ```
//!
//! ## Being polite
//!
//! The defaults (3 workers, 1 s between admissions, 200 ms between image
//! downloads, 500 ms between catalog pages) keep the request rate close to
//! what a person clicking through the site would produce. Failed requests
//! are not retried; run the sync again to pick up what failed.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scrape;
pub mod stream;
pub mod sync;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{fetch_catalog, CatalogItem, CatalogPage, CatalogSource};
pub use client::{extract_xsrf_token, GuitarWorldClient};
pub use config::{Endpoints, SyncConfig, SyncConfigBuilder, COOKIES_ENV};
pub use error::{AssemblyError, FailureKind, FetchError, SheetError, SyncError};
pub use output::{CatalogEntry, ItemStatus, ProcessOutcome, SyncSummary};
pub use pipeline::fetch::ItemFetcher;
pub use pipeline::process::SheetProcessor;
pub use progress::{NoopProgressCallback, ProgressCallback, SyncProgressCallback};
pub use stream::{sync_stream, OutcomeStream};
pub use sync::{list_catalog, sync, sync_items, sync_with};
