//! Per-item work: catalog entry → PDF on disk.
//!
//! [`SheetProcessor::process`] never returns an error. Every failure is
//! captured in the returned [`ProcessOutcome`] so one bad item cannot stop
//! the rest of the catalog.

use crate::catalog::CatalogItem;
use crate::config::SyncConfig;
use crate::error::SheetError;
use crate::output::{ItemStatus, ProcessOutcome};
use crate::pipeline::assemble::{self, ImagePage};
use crate::pipeline::fetch::ItemFetcher;
use crate::pipeline::paths::{self, PathDefaults};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Turns one catalog item into a PDF under the output root.
pub struct SheetProcessor {
    fetcher: Arc<dyn ItemFetcher>,
    output_dir: PathBuf,
    default_creator: String,
    default_category: String,
    download_pacing: Duration,
}

impl SheetProcessor {
    pub fn new(fetcher: Arc<dyn ItemFetcher>, config: &SyncConfig) -> Self {
        Self {
            fetcher,
            output_dir: config.output_dir.clone(),
            default_creator: config.default_creator.clone(),
            default_category: config.default_category.clone(),
            download_pacing: config.download_pacing(),
        }
    }

    /// Where `item`'s PDF lives (or will live).
    pub fn output_path(&self, item: &CatalogItem) -> PathBuf {
        paths::output_path(
            &self.output_dir,
            item,
            PathDefaults {
                creator: &self.default_creator,
                category: &self.default_category,
            },
        )
    }

    /// Process one item. `position` is 1-indexed out of `total`.
    pub async fn process(&self, item: &CatalogItem, position: usize, total: usize) -> ProcessOutcome {
        let start = Instant::now();
        let path = self.output_path(item);

        info!(
            "[{}/{}] Processing: {} (ID: {}) by {}",
            position,
            total,
            item.display_title(),
            item.id,
            item.creator_name
        );

        let status = match self.run(item, &path, position, total).await {
            Ok(status) => status,
            Err(error) => ItemStatus::Failed { error },
        };

        ProcessOutcome {
            item: item.clone(),
            position,
            path,
            status,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn run(
        &self,
        item: &CatalogItem,
        path: &Path,
        position: usize,
        total: usize,
    ) -> Result<ItemStatus, SheetError> {
        // ── Step 1: Ensure the creator directory ─────────────────────────
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SheetError::Directory {
                    path: dir.to_path_buf(),
                    detail: e.to_string(),
                })?;
        }

        // ── Step 2: Skip what is already on disk ─────────────────────────
        if matches!(tokio::fs::try_exists(path).await, Ok(true)) {
            info!("[{}/{}] Skipping (exists): {}", position, total, path.display());
            return Ok(ItemStatus::Skipped);
        }

        // ── Step 3: Resolve page images ──────────────────────────────────
        let urls = self
            .fetcher
            .resolve_image_urls(item.id)
            .await
            .map_err(|e| SheetError::Resolve {
                detail: e.to_string(),
            })?;
        if urls.is_empty() {
            return Err(SheetError::NoImages);
        }
        info!(
            "[{}/{}] Found {} images, downloading...",
            position,
            total,
            urls.len()
        );

        // ── Step 4: Download sequentially, in page order ─────────────────
        let mut pages = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            let index = i + 1;
            let data = self
                .fetcher
                .download(url)
                .await
                .map_err(|e| SheetError::Download {
                    page: index,
                    detail: e.to_string(),
                })?;
            debug!(
                "[{}/{}] Downloaded image {}/{} ({} bytes)",
                position,
                total,
                index,
                urls.len(),
                data.len()
            );
            pages.push(ImagePage { index, data });

            if !self.download_pacing.is_zero() {
                tokio::time::sleep(self.download_pacing).await;
            }
        }

        // ── Step 5: Assemble and write atomically ────────────────────────
        info!("[{}/{}] Creating PDF with {} pages...", position, total, pages.len());
        let page_count = assemble::write_pdf(pages, path).await?;
        info!("[{}/{}] Created: {}", position, total, path.display());

        Ok(ItemStatus::Created { pages: page_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 16, Rgb([0, 0, 0])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    /// Returns `pages` URLs per item; optionally fails the download of one page.
    struct FakeFetcher {
        pages: usize,
        fail_page: Option<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ItemFetcher for FakeFetcher {
        async fn resolve_image_urls(&self, item_id: u64) -> Result<Vec<String>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((1..=self.pages)
                .map(|p| format!("https://img.test/{item_id}/{p}.png"))
                .collect())
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page: usize = url
                .rsplit('/')
                .next()
                .and_then(|f| f.strip_suffix(".png"))
                .and_then(|n| n.parse().ok())
                .unwrap();
            if self.fail_page == Some(page) {
                return Err(FetchError::Status {
                    url: url.into(),
                    status: 404,
                });
            }
            Ok(png())
        }
    }

    fn processor(dir: &Path, fetcher: Arc<FakeFetcher>) -> SheetProcessor {
        let config = SyncConfig::builder()
            .output_dir(dir)
            .download_pacing_ms(0)
            .build()
            .unwrap();
        SheetProcessor::new(fetcher, &config)
    }

    fn item() -> CatalogItem {
        CatalogItem {
            id: 11,
            name: "Song".into(),
            subtitle: String::new(),
            creator_name: "Band".into(),
            category_label: "Tab".into(),
        }
    }

    #[tokio::test]
    async fn creates_pdf_with_all_pages() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            pages: 3,
            fail_page: None,
            calls: AtomicUsize::new(0),
        });
        let p = processor(dir.path(), fetcher);

        let outcome = p.process(&item(), 1, 1).await;

        assert!(matches!(outcome.status, ItemStatus::Created { pages: 3 }));
        assert_eq!(outcome.path, dir.path().join("Band").join("[Tab] Song.pdf"));
        let doc = lopdf::Document::load(&outcome.path).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[tokio::test]
    async fn existing_file_is_skipped_without_network() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            pages: 1,
            fail_page: None,
            calls: AtomicUsize::new(0),
        });
        let p = processor(dir.path(), Arc::clone(&fetcher));
        let path = p.output_path(&item());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"existing").unwrap();

        let outcome = p.process(&item(), 1, 1).await;

        assert!(outcome.is_skipped());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"existing");
    }

    #[tokio::test]
    async fn failed_download_reports_page_and_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            pages: 3,
            fail_page: Some(2),
            calls: AtomicUsize::new(0),
        });
        let p = processor(dir.path(), fetcher);

        let outcome = p.process(&item(), 4, 9).await;

        assert_eq!(outcome.position, 4);
        assert!(matches!(
            outcome.error(),
            Some(SheetError::Download { page: 2, .. })
        ));
        assert!(!outcome.path.exists());
    }

    #[tokio::test]
    async fn no_images_is_a_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            pages: 0,
            fail_page: None,
            calls: AtomicUsize::new(0),
        });
        let p = processor(dir.path(), fetcher);

        let outcome = p.process(&item(), 1, 1).await;

        assert!(matches!(outcome.error(), Some(SheetError::NoImages)));
        assert!(!outcome.path.exists());
    }
}
