//! Per-item pipeline stages.
//!
//! Each submodule implements exactly one step of turning a catalog item into
//! a PDF. The coordinator in [`crate::stream`] runs [`process`] for many
//! items at once; everything below it is sequential per item.
//!
//! ## Data Flow
//!
//! ```text
//! paths ──▶ fetch ──▶ fetch ──▶ assemble
//! (target)  (resolve) (download) (PDF, atomic write)
//! ```
//!
//! 1. [`paths`]: derive the deterministic target path; an existing file
//!    means the item is already synced
//! 2. [`fetch`]: the network seam (resolve image URLs, download bytes)
//! 3. [`assemble`]: lay out one image per A4 page and write the PDF via a
//!    scratch file; CPU-bound, runs in `spawn_blocking`
//! 4. [`process`]: drives 1–3 for one item and folds every failure into a
//!    [`crate::output::ProcessOutcome`]

pub mod assemble;
pub mod fetch;
pub mod paths;
pub mod process;
