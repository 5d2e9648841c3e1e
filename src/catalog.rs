//! Catalog model and the paginated listing loop.
//!
//! The vendor exposes the purchased catalog as numbered pages. A
//! [`CatalogSource`] returns one page at a time; [`fetch_catalog`] walks the
//! pages in order until the listing runs out.

use crate::error::{FetchError, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// One owned sheet-music entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: u64,
    pub name: String,
    pub subtitle: String,
    pub creator_name: String,
    /// Score type, e.g. "吉他谱" (guitar tab) or "尤克里里谱" (ukulele tab).
    pub category_label: String,
}

impl CatalogItem {
    /// `name - subtitle`, or just `name` when there is no subtitle.
    pub fn display_title(&self) -> String {
        if self.subtitle.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.subtitle)
        }
    }
}

/// One page of the catalog listing.
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub items: Vec<CatalogItem>,
    pub current_page: u32,
    /// 0 when the service did not report pagination.
    pub last_page: u32,
    /// Total number of items across all pages, as reported by the service.
    pub total: u32,
}

impl CatalogPage {
    /// Whether no further page should be requested after this one.
    pub fn is_last(&self) -> bool {
        self.items.is_empty() || (self.last_page > 0 && self.current_page >= self.last_page)
    }
}

/// Paginated source of catalog items.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the 1-indexed listing page `page`.
    async fn list_page(&self, page: u32) -> Result<CatalogPage, FetchError>;
}

/// Read every catalog page, starting at page 1.
///
/// Stops after an empty page or once `current_page >= last_page`. Sleeps
/// `pacing` between consecutive requests. Any page failure aborts the whole
/// listing, since a partial catalog would silently drop items.
pub async fn fetch_catalog(
    source: &dyn CatalogSource,
    pacing: Duration,
) -> Result<Vec<CatalogItem>, SyncError> {
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        debug!("Fetching catalog page {}", page);
        let listing = source
            .list_page(page)
            .await
            .map_err(|source| SyncError::Catalog { page, source })?;

        let count = listing.items.len();
        let last = listing.is_last();
        items.extend(listing.items);
        info!(
            "Catalog page {}: {} items (total so far: {})",
            page,
            count,
            items.len()
        );

        if last {
            debug!("Reached last catalog page");
            break;
        }

        page += 1;
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves pre-built pages; records which page numbers were requested.
    struct PagedSource {
        pages: Vec<Result<CatalogPage, FetchError>>,
        requested: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl CatalogSource for PagedSource {
        async fn list_page(&self, page: u32) -> Result<CatalogPage, FetchError> {
            self.requested.lock().unwrap().push(page);
            self.pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_else(|| Ok(CatalogPage::default()))
        }
    }

    fn page(ids: &[u64], current: u32, last: u32) -> Result<CatalogPage, FetchError> {
        Ok(CatalogPage {
            items: ids
                .iter()
                .map(|&id| CatalogItem {
                    id,
                    name: format!("Song {id}"),
                    ..CatalogItem::default()
                })
                .collect(),
            current_page: current,
            last_page: last,
            total: 0,
        })
    }

    #[test]
    fn stops_at_last_page() {
        let source = PagedSource {
            pages: vec![page(&[1, 2], 1, 2), page(&[3], 2, 2), page(&[99], 3, 2)],
            requested: Mutex::new(Vec::new()),
        };
        let items = tokio_test::block_on(fetch_catalog(&source, Duration::ZERO)).unwrap();
        let ids: Vec<u64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn stops_on_empty_page_without_pagination() {
        let source = PagedSource {
            pages: vec![page(&[1], 1, 0), page(&[2], 2, 0)],
            requested: Mutex::new(Vec::new()),
        };
        let items = tokio_test::block_on(fetch_catalog(&source, Duration::ZERO)).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn page_failure_is_fatal() {
        let source = PagedSource {
            pages: vec![
                page(&[1], 1, 3),
                Err(FetchError::Api {
                    message: "not logged in".into(),
                }),
            ],
            requested: Mutex::new(Vec::new()),
        };
        let err = tokio_test::block_on(fetch_catalog(&source, Duration::ZERO)).unwrap_err();
        assert!(matches!(err, SyncError::Catalog { page: 2, .. }));
    }

    #[test]
    fn display_title_joins_subtitle() {
        let mut item = CatalogItem {
            name: "晴天".into(),
            ..CatalogItem::default()
        };
        assert_eq!(item.display_title(), "晴天");
        item.subtitle = "C调".into();
        assert_eq!(item.display_title(), "晴天 - C调");
    }
}
