//! Live HTTP client for the Guitar World user area.
//!
//! Every request carries the user's browser cookies, a fixed `Referer`, a
//! desktop `User-Agent` and, when known, the `X-XSRF-TOKEN` header, which is
//! what the site expects from its own front end. There are no retries: a
//! failed request fails the item (or, for the catalog, the run).

use crate::catalog::{CatalogItem, CatalogPage, CatalogSource};
use crate::config::{Endpoints, SyncConfig};
use crate::error::{FetchError, SyncError};
use crate::pipeline::fetch::ItemFetcher;
use crate::scrape::discover_image_urls;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, COOKIE, PRAGMA, REFERER};
use serde::Deserialize;
use tracing::{debug, warn};

static RE_XSRF: Lazy<Regex> = Lazy::new(|| Regex::new(r"XSRF-TOKEN=([^;]+)").unwrap());

const ACCEPT_JSON: &str = "application/json, text/plain, */*";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7";
const XSRF_HEADER: &str = "X-XSRF-TOKEN";
const API_OK: i64 = 1;

/// The `XSRF-TOKEN` value from a `Cookie` header string, if present.
pub fn extract_xsrf_token(cookies: &str) -> Option<String> {
    RE_XSRF
        .captures(cookies)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

pub struct GuitarWorldClient {
    http: reqwest::Client,
    cookies: String,
    xsrf_token: Option<String>,
    endpoints: Endpoints,
    timeout_secs: u64,
}

impl GuitarWorldClient {
    /// Build a client for `cookies`.
    ///
    /// The XSRF token comes from `config.xsrf_token` or, failing that, from
    /// the cookie string. A missing token is only a warning; some requests
    /// may then be rejected by the site.
    pub fn new(cookies: impl Into<String>, config: &SyncConfig) -> Result<Self, SyncError> {
        let cookies = cookies.into();
        let xsrf_token = config
            .xsrf_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| extract_xsrf_token(&cookies));
        if xsrf_token.is_none() {
            warn!("XSRF-TOKEN not found in cookies; requests may be rejected");
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.endpoints.user_agent.as_str())
            .build()
            .map_err(|e| SyncError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            cookies,
            xsrf_token,
            endpoints: config.endpoints.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response, FetchError> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, accept)
            .header(COOKIE, self.cookies.as_str())
            .header(REFERER, self.endpoints.referer.as_str());
        if accept != ACCEPT_JSON {
            request = request
                .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }
        if let Some(token) = &self.xsrf_token {
            request = request.header(XSRF_HEADER, token.as_str());
        }

        let response = request.send().await.map_err(|e| self.transport_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl CatalogSource for GuitarWorldClient {
    async fn list_page(&self, page: u32) -> Result<CatalogPage, FetchError> {
        let url = format!("{}?page={}", self.endpoints.list_url, page);
        let body = self
            .get(&url, ACCEPT_JSON)
            .await?
            .text()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        parse_list_page(&url, &body)
    }
}

#[async_trait]
impl ItemFetcher for GuitarWorldClient {
    async fn resolve_image_urls(&self, item_id: u64) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/{}", self.endpoints.detail_url.trim_end_matches('/'), item_id);
        let html = self
            .get(&url, ACCEPT_HTML)
            .await?
            .text()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        let urls = discover_image_urls(&html, &self.endpoints.image_host);
        debug!("Detail page {}: {} image URLs", url, urls.len());
        Ok(urls)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self
            .get(url, ACCEPT_HTML)
            .await?
            .bytes()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        if bytes.is_empty() {
            return Err(FetchError::InvalidResponse {
                url: url.to_string(),
                reason: "empty body".into(),
            });
        }
        Ok(bytes.to_vec())
    }
}

// ── Listing wire format ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    state: i64,
    #[serde(default)]
    data: Option<ListData>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListData {
    #[serde(default)]
    list: Vec<RawSheet>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    total: u32,
    #[serde(default)]
    current_page: u32,
    #[serde(default)]
    last_page: u32,
}

#[derive(Debug, Deserialize)]
struct RawSheet {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sub_title: Option<String>,
    #[serde(default)]
    creator_name: Option<String>,
    #[serde(default)]
    qupu: Option<RawQupu>,
}

#[derive(Debug, Deserialize)]
struct RawQupu {
    #[serde(default)]
    category_txt: Option<String>,
}

impl From<RawSheet> for CatalogItem {
    fn from(raw: RawSheet) -> Self {
        CatalogItem {
            id: raw.id,
            name: raw.name.unwrap_or_default(),
            subtitle: raw.sub_title.unwrap_or_default(),
            creator_name: raw.creator_name.unwrap_or_default(),
            category_label: raw.qupu.and_then(|q| q.category_txt).unwrap_or_default(),
        }
    }
}

fn parse_list_page(url: &str, body: &str) -> Result<CatalogPage, FetchError> {
    let response: ListResponse =
        serde_json::from_str(body).map_err(|e| FetchError::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if response.state != API_OK {
        return Err(FetchError::Api {
            message: response
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("state {}", response.state)),
        });
    }

    let data = response.data.unwrap_or_default();
    let pagination = data.pagination.unwrap_or_default();
    Ok(CatalogPage {
        items: data.list.into_iter().map(CatalogItem::from).collect(),
        current_page: pagination.current_page,
        last_page: pagination.last_page,
        total: pagination.total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://api.test/list?page=1";

    #[test]
    fn extracts_xsrf_token() {
        let cookies = "a=1; XSRF-TOKEN=eyJpdiI6IkF%3D; laravel_session=xyz";
        assert_eq!(extract_xsrf_token(cookies).as_deref(), Some("eyJpdiI6IkF%3D"));
        assert_eq!(extract_xsrf_token("XSRF-TOKEN=last"), Some("last".to_string()));
        assert_eq!(extract_xsrf_token("session=1"), None);
    }

    #[test]
    fn parses_listing_page() {
        let body = r#"{
            "state": 1,
            "message": "",
            "data": {
                "list": [
                    {"id": 101, "type": 1, "name": "晴天", "sub_title": "C调",
                     "creator_name": "Tabber", "singer": "周杰伦",
                     "qupu": {"category_txt": "吉他谱"}},
                    {"id": 102, "name": "Untitled", "sub_title": null,
                     "creator_name": null, "qupu": null}
                ],
                "pagination": {"total": 30, "per_page": 15, "current_page": 1, "last_page": 2}
            }
        }"#;

        let page = parse_list_page(URL, body).unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].category_label, "吉他谱");
        assert_eq!(page.items[0].subtitle, "C调");
        assert_eq!(page.items[1].creator_name, "");
        assert_eq!(page.items[1].category_label, "");
        assert_eq!((page.current_page, page.last_page, page.total), (1, 2, 30));
        assert!(!page.is_last());
    }

    #[test]
    fn api_error_state_is_reported() {
        let body = r#"{"state": 0, "message": "请先登录", "data": null}"#;
        match parse_list_page(URL, body) {
            Err(FetchError::Api { message }) => assert_eq!(message, "请先登录"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn non_json_body_is_invalid_response() {
        let err = parse_list_page(URL, "<html>login</html>").unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponse { .. }));
    }

    #[test]
    fn missing_data_is_an_empty_last_page() {
        let page = parse_list_page(URL, r#"{"state": 1}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.is_last());
    }

    #[test]
    fn explicit_token_wins_over_cookie() {
        let config = SyncConfig::builder()
            .xsrf_token("explicit")
            .build()
            .unwrap();
        let client = GuitarWorldClient::new("XSRF-TOKEN=from-cookie", &config).unwrap();
        assert_eq!(client.xsrf_token.as_deref(), Some("explicit"));

        let config = SyncConfig::builder().build().unwrap();
        let client = GuitarWorldClient::new("XSRF-TOKEN=from-cookie", &config).unwrap();
        assert_eq!(client.xsrf_token.as_deref(), Some("from-cookie"));
    }
}
