//! Deterministic output paths.
//!
//! The PDF's location is the only record that an item was synced, so the
//! mapping from catalog fields to a path must be pure and stable across
//! runs. Layout:
//!
//! ```text
//! <output_dir>/<creator>/[<category>] <title>[ - <subtitle>].pdf
//! ```

use crate::catalog::CatalogItem;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Maximum length of the file stem, in bytes, before `.pdf` is appended.
///
/// Counted in bytes so CJK titles stay well under the 255-byte component
/// limit of common filesystems; the cut always lands on a char boundary.
pub const MAX_STEM_BYTES: usize = 200;

static RE_RESERVED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());

static RE_UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Make `name` safe to use as a single path component.
///
/// Reserved and control characters become `_` and runs of `_` collapse to
/// one. Leading and trailing whitespace, `_` and `.` are stripped, so the
/// result can never be `.` or `..`. Spaces inside the name are kept.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced = RE_RESERVED.replace_all(name, "_");
    let collapsed = RE_UNDERSCORE_RUN.replace_all(&replaced, "_");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || c == '_' || c == '.')
        .to_string()
}

/// Fallback names used when an item's own fields sanitise to nothing.
#[derive(Debug, Clone, Copy)]
pub struct PathDefaults<'a> {
    pub creator: &'a str,
    pub category: &'a str,
}

/// Sub-directory (relative to the output root) holding the creator's scores.
pub fn creator_dir_name(item: &CatalogItem, defaults: PathDefaults<'_>) -> String {
    non_empty_or(sanitize_file_name(&item.creator_name), defaults.creator)
}

/// `[<category>] <title>[ - <subtitle>].pdf`, capped at [`MAX_STEM_BYTES`].
pub fn file_name(item: &CatalogItem, defaults: PathDefaults<'_>) -> String {
    let category = non_empty_or(sanitize_file_name(&item.category_label), defaults.category);

    let title = sanitize_file_name(&item.name);
    let mut stem = if title.is_empty() {
        format!("[{category}] sheet_{}", item.id)
    } else {
        format!("[{category}] {title}")
    };

    let subtitle = sanitize_file_name(&item.subtitle);
    if !subtitle.is_empty() {
        stem.push_str(" - ");
        stem.push_str(&subtitle);
    }

    if stem.len() > MAX_STEM_BYTES {
        let mut cut = MAX_STEM_BYTES;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        stem.truncate(cut);
    }
    let stem = stem.trim_end();

    format!("{stem}.pdf")
}

/// Full target path of an item's PDF below `root`.
pub fn output_path(root: &Path, item: &CatalogItem, defaults: PathDefaults<'_>) -> PathBuf {
    root.join(creator_dir_name(item, defaults))
        .join(file_name(item, defaults))
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        sanitize_file_name(fallback)
    } else {
        value
    }
}
