//! Item-level network capability: find a score's page images and download them.
//!
//! The sheet processor only sees this trait. The live implementation scrapes
//! the vendor's detail page ([`crate::client::GuitarWorldClient`]); tests use
//! deterministic in-memory fakes.

use crate::error::FetchError;
use async_trait::async_trait;

#[async_trait]
pub trait ItemFetcher: Send + Sync {
    /// Absolute URLs of the item's page images, in page order, deduplicated.
    async fn resolve_image_urls(&self, item_id: u64) -> Result<Vec<String>, FetchError>;

    /// Raw encoded bytes of one image.
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
