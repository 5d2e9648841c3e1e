//! Score image discovery in the vendor's detail-page HTML.
//!
//! The page layout is not under our control and has changed over time, so
//! discovery tries a list of tag matchers in priority order and keeps the
//! images of the first matcher that finds anything. If none match, any
//! plausible content image (`.jpg`/`.jpeg`/`.png`, not an avatar, logo or
//! icon) is taken instead.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static RE_IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());

static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

/// The attributes discovery cares about, from one `<img>` tag.
#[derive(Debug, Default)]
struct ImgTag {
    src: Option<String>,
    data_src: Option<String>,
    classes: Vec<String>,
}

impl ImgTag {
    fn parse(tag: &str) -> Self {
        let mut img = ImgTag::default();
        // Skip the tag name so `<img` itself never looks like an attribute.
        let body = tag.get(4..).unwrap_or_default();
        for cap in RE_ATTR.captures_iter(body) {
            let name = cap[1].to_ascii_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            if value.is_empty() {
                continue;
            }
            match name.as_str() {
                "src" => img.src = Some(value.to_string()),
                "data-src" => img.data_src = Some(value.to_string()),
                "class" => img.classes = value.split_whitespace().map(str::to_string).collect(),
                _ => {}
            }
        }
        img
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn src_contains(&self, needle: &str) -> bool {
        self.src.as_deref().is_some_and(|s| s.contains(needle))
    }
}

fn is_score_class(img: &ImgTag) -> bool {
    img.has_class("qupu-img")
}

fn src_mentions_qupu(img: &ImgTag) -> bool {
    img.src_contains("qupu")
}

fn src_mentions_pu(img: &ImgTag) -> bool {
    img.src_contains("pu_")
}

fn is_lazy_loaded(img: &ImgTag) -> bool {
    img.data_src.is_some()
}

fn is_score_image_class(img: &ImgTag) -> bool {
    img.has_class("score-image")
}

/// Matchers in priority order.
static MATCHERS: &[fn(&ImgTag) -> bool] = &[
    is_score_class,
    src_mentions_qupu,
    src_mentions_pu,
    is_lazy_loaded,
    is_score_image_class,
];

const FALLBACK_EXCLUDED: &[&str] = &["avatar", "logo", "icon"];
const FALLBACK_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// Absolute, deduplicated image URLs of a score, in document order.
///
/// Relative URLs are resolved against `image_host` and protocol-relative
/// ones get `https:`. Inline `data:` URIs (lazy-load placeholders) are
/// ignored.
pub fn discover_image_urls(html: &str, image_host: &str) -> Vec<String> {
    let tags: Vec<ImgTag> = RE_IMG_TAG
        .find_iter(html)
        .map(|m| ImgTag::parse(m.as_str()))
        .collect();

    let mut candidates = Vec::new();
    for matcher in MATCHERS {
        for img in tags.iter().filter(|t| matcher(t)) {
            candidates.extend(img.src.iter().cloned());
            candidates.extend(img.data_src.iter().cloned());
        }
        candidates.retain(|u| !is_inline(u));
        if !candidates.is_empty() {
            break;
        }
    }

    if candidates.is_empty() {
        candidates = tags
            .iter()
            .filter_map(|t| t.src.as_ref().or(t.data_src.as_ref()))
            .filter(|u| !is_inline(u))
            .filter(|u| !FALLBACK_EXCLUDED.iter().any(|x| u.contains(x)))
            .filter(|u| FALLBACK_EXTENSIONS.iter().any(|x| u.contains(x)))
            .cloned()
            .collect();
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|u| absolutize(&u, image_host))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

fn is_inline(url: &str) -> bool {
    url.starts_with("data:")
}

fn absolutize(url: &str, host: &str) -> String {
    let url = url.replace("&amp;", "&");
    if url.starts_with("http://") || url.starts_with("https://") {
        url
    } else if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else if url.starts_with('/') {
        format!("{}{}", host.trim_end_matches('/'), url)
    } else {
        format!("{}/{}", host.trim_end_matches('/'), url)
    }
}
