//! Error types for the guitarworld-sync library.
//!
//! Three layers of failure exist, and each has its own type:
//!
//! * [`SyncError`]: **fatal**, the run cannot start or cannot obtain its
//!   work list (no credentials, output directory unusable, catalog listing
//!   failed). Returned as `Err(SyncError)` from the top-level `sync*`
//!   functions and mapped to a non-zero exit by the CLI.
//!
//! * [`SheetError`]: **non-fatal**, a single catalog item failed. Stored in
//!   [`crate::output::ProcessOutcome`] so the remaining items still run and
//!   the final summary can report every failure.
//!
//! * [`FetchError`] / [`AssemblyError`]: transport and PDF-building failures
//!   raised by the collaborators. The sheet processor folds them into a
//!   [`SheetError`] tagged with the step that failed.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the guitarworld-sync library.
#[derive(Debug, Error)]
pub enum SyncError {
    // ── Setup errors ──────────────────────────────────────────────────────
    /// No session cookies were supplied.
    #[error("Session cookies are missing.\nExport them in {var} (copy the Cookie header from a logged-in browser session).")]
    MissingCredentials { var: String },

    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// A catalog listing page could not be fetched.
    #[error("Failed to fetch catalog page {page}: {source}")]
    Catalog {
        page: u32,
        #[source]
        source: FetchError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A transport-level failure talking to the vendor service.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} for '{url}'")]
    Status { url: String, status: u16 },

    /// The request exceeded the client timeout.
    #[error("Request timed out after {secs}s for '{url}'")]
    Timeout { url: String, secs: u64 },

    /// Connection, TLS or body-read failure.
    #[error("Request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    /// The body could not be interpreted (bad JSON, not UTF-8, …).
    #[error("Unexpected response from '{url}': {reason}")]
    InvalidResponse { url: String, reason: String },

    /// The listing API reported an application-level error.
    #[error("API error: {message}")]
    Api { message: String },
}

/// Failure while turning page images into a PDF file.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("No pages to assemble")]
    NoPages,

    /// A page could not be decoded (unknown or corrupt image data).
    #[error("Page {page}: cannot decode image: {detail}")]
    Decode { page: usize, detail: String },

    /// A page needed transcoding and the JPEG encoder failed.
    #[error("Page {page}: cannot encode image: {detail}")]
    Encode { page: usize, detail: String },

    /// lopdf failed to serialise the document.
    #[error("PDF serialisation failed: {0}")]
    Pdf(String),

    /// The finished document could not be written to disk.
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A non-fatal error for a single catalog item.
///
/// The run continues; the error is reported through
/// [`crate::output::ItemStatus::Failed`] and counted in the summary.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum SheetError {
    /// The creator directory could not be created.
    #[error("cannot create directory '{path}': {detail}")]
    Directory { path: PathBuf, detail: String },

    /// The detail page listing the score images could not be fetched.
    #[error("cannot resolve page images: {detail}")]
    Resolve { detail: String },

    /// The detail page was fetched but no score images were found on it.
    #[error("no page images found")]
    NoImages,

    /// One page image failed to download (1-indexed page).
    #[error("download of page {page} failed: {detail}")]
    Download { page: usize, detail: String },

    /// The PDF could not be assembled or written.
    #[error("PDF assembly failed: {detail}")]
    Assembly { detail: String },

    /// The processing task died unexpectedly.
    #[error("internal error: {detail}")]
    Internal { detail: String },
}

/// Coarse classification of a [`SheetError`], used to group failures in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Directory,
    Resolve,
    NoImages,
    Download,
    Assembly,
    Internal,
}

impl SheetError {
    /// The failure category of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            SheetError::Directory { .. } => FailureKind::Directory,
            SheetError::Resolve { .. } => FailureKind::Resolve,
            SheetError::NoImages => FailureKind::NoImages,
            SheetError::Download { .. } => FailureKind::Download,
            SheetError::Assembly { .. } => FailureKind::Assembly,
            SheetError::Internal { .. } => FailureKind::Internal,
        }
    }
}

impl From<AssemblyError> for SheetError {
    fn from(e: AssemblyError) -> Self {
        SheetError::Assembly {
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_names_variable() {
        let e = SyncError::MissingCredentials {
            var: "GUITARWORLD_COOKIES".into(),
        };
        assert!(e.to_string().contains("GUITARWORLD_COOKIES"));
    }

    #[test]
    fn catalog_error_display_includes_page_and_cause() {
        let e = SyncError::Catalog {
            page: 3,
            source: FetchError::Status {
                url: "https://example.com/list?page=3".into(),
                status: 502,
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("502"), "got: {msg}");
    }

    #[test]
    fn download_error_reports_page() {
        let e = SheetError::Download {
            page: 4,
            detail: "HTTP 404".into(),
        };
        assert!(e.to_string().contains("page 4"));
        assert_eq!(e.kind(), FailureKind::Download);
    }

    #[test]
    fn assembly_error_converts_to_sheet_error() {
        let e: SheetError = AssemblyError::Decode {
            page: 2,
            detail: "bad magic".into(),
        }
        .into();
        assert_eq!(e.kind(), FailureKind::Assembly);
        assert!(e.to_string().contains("Page 2"));
    }

    #[test]
    fn failure_kind_serialises_snake_case() {
        let json = serde_json::to_string(&FailureKind::NoImages).unwrap();
        assert_eq!(json, "\"no_images\"");
    }
}
