//! Configuration types for a catalog sync run.
//!
//! All run behaviour is controlled through [`SyncConfig`], built via its
//! [`SyncConfigBuilder`]. One struct carries every knob, so the coordinator
//! and the sheet processor receive their settings explicitly. Nothing below
//! the CLI reads the process environment.

use crate::error::SyncError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable the CLI reads the session cookies from.
pub const COOKIES_ENV: &str = "GUITARWORLD_COOKIES";

/// Creator directory used when an item has no usable creator name ("unknown creator").
pub const DEFAULT_CREATOR: &str = "未知创建者";

/// Category label used when an item has none ("guitar tab").
pub const DEFAULT_CATEGORY: &str = "吉他谱";

/// Configuration for a catalog sync run.
///
/// Built via [`SyncConfig::builder()`] or using [`SyncConfig::default()`].
///
/// # Example
/// ```rust
/// use guitarworld_sync::SyncConfig;
///
/// let config = SyncConfig::builder()
///     .output_dir("./scores")
///     .concurrency(2)
///     .cookies("XSRF-TOKEN=abc; laravel_session=xyz")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct SyncConfig {
    /// Root directory receiving one sub-directory per creator. Default: `./pdfs`.
    pub output_dir: PathBuf,

    /// Maximum number of catalog items processed at once. Default: 3.
    ///
    /// The vendor throttles aggressive clients; a small pool plus pacing keeps
    /// the request rate polite.
    pub concurrency: usize,

    /// Delay a worker holds its slot after finishing an item, in ms. Default: 1000.
    pub task_pacing_ms: u64,

    /// Delay after each page-image download within one item, in ms. Default: 200.
    pub download_pacing_ms: u64,

    /// Delay between catalog listing pages, in ms. Default: 500.
    pub listing_pacing_ms: u64,

    /// Per-request HTTP timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Raw `Cookie` header value of a logged-in browser session.
    pub cookies: Option<String>,

    /// `X-XSRF-TOKEN` header value. Derived from `cookies` when `None`.
    pub xsrf_token: Option<String>,

    /// Vendor URLs.
    pub endpoints: Endpoints,

    /// Creator directory name used when an item's creator sanitises to nothing.
    pub default_creator: String,

    /// Category label used when an item has none.
    pub default_category: String,

    /// Receives per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./pdfs"),
            concurrency: 3,
            task_pacing_ms: 1000,
            download_pacing_ms: 200,
            listing_pacing_ms: 500,
            request_timeout_secs: 60,
            cookies: None,
            xsrf_token: None,
            endpoints: Endpoints::default(),
            default_creator: DEFAULT_CREATOR.to_string(),
            default_category: DEFAULT_CATEGORY.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("output_dir", &self.output_dir)
            .field("concurrency", &self.concurrency)
            .field("task_pacing_ms", &self.task_pacing_ms)
            .field("download_pacing_ms", &self.download_pacing_ms)
            .field("listing_pacing_ms", &self.listing_pacing_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cookies", &self.cookies.as_ref().map(|_| "<redacted>"))
            .field("xsrf_token", &self.xsrf_token.as_ref().map(|_| "<redacted>"))
            .field("endpoints", &self.endpoints)
            .field("default_creator", &self.default_creator)
            .field("default_category", &self.default_category)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn SyncProgressCallback>"),
            )
            .finish()
    }
}

impl SyncConfig {
    /// Create a new builder for `SyncConfig`.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn task_pacing(&self) -> Duration {
        Duration::from_millis(self.task_pacing_ms)
    }

    pub fn download_pacing(&self) -> Duration {
        Duration::from_millis(self.download_pacing_ms)
    }

    pub fn listing_pacing(&self) -> Duration {
        Duration::from_millis(self.listing_pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for [`SyncConfig`].
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl fmt::Debug for SyncConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl SyncConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn task_pacing_ms(mut self, ms: u64) -> Self {
        self.config.task_pacing_ms = ms;
        self
    }

    pub fn download_pacing_ms(mut self, ms: u64) -> Self {
        self.config.download_pacing_ms = ms;
        self
    }

    pub fn listing_pacing_ms(mut self, ms: u64) -> Self {
        self.config.listing_pacing_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn cookies(mut self, cookies: impl Into<String>) -> Self {
        self.config.cookies = Some(cookies.into());
        self
    }

    pub fn xsrf_token(mut self, token: impl Into<String>) -> Self {
        self.config.xsrf_token = Some(token.into());
        self
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn default_creator(mut self, name: impl Into<String>) -> Self {
        self.config.default_creator = name.into();
        self
    }

    pub fn default_category(mut self, label: impl Into<String>) -> Self {
        self.config.default_category = label.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SyncConfig, SyncError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(SyncError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig(
                "Output directory must not be empty".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.default_creator.trim().is_empty() || c.default_category.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "Fallback creator and category names must not be blank".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Endpoints ────────────────────────────────────────────────────────────

/// URLs of the vendor service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Paginated JSON listing of the user's purchased scores.
    pub list_url: String,
    /// Base URL of the per-score detail page; the item id is appended.
    pub detail_url: String,
    /// Host prepended to relative image URLs.
    pub image_host: String,
    /// `Referer` sent with every request.
    pub referer: String,
    pub user_agent: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            list_url: "https://user.guitarworld.com.cn/user/pu/my/pu_list".to_string(),
            detail_url: "https://user.guitarworld.com.cn/user/pu/my".to_string(),
            image_host: "https://www.guitarworld.com.cn".to_string(),
            referer: "https://user.guitarworld.com.cn/user/pu/my".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}
