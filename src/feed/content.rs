//! Body-text resolution for a raw entry.
//!
//! Feeds carry the full text of a post under inconsistent keys. The rules
//! below are tried in order and the first one that matches wins. Each rule is
//! a plain function so it can be tested on its own.

use super::raw::{RawFeedEntry, RawValue};
use crate::path;
use crate::sanitize::escape_text;

/// The MIME type under which a summary is already HTML.
const HTML_CONTENT_TYPE: &str = "text/html";

/// A named rule: returns `Some(body)` when it applies to the entry.
pub struct ContentRule {
    pub name: &'static str,
    pub extract: fn(&RawFeedEntry) -> Option<String>,
}

/// Content rules in precedence order.
pub const CONTENT_RULES: &[ContentRule] = &[
    ContentRule {
        name: "content_block",
        extract: content_block,
    },
    ContentRule {
        name: "full_text",
        extract: full_text,
    },
    ContentRule {
        name: "vendor_full_text",
        extract: vendor_full_text,
    },
    ContentRule {
        name: "summary_detail",
        extract: summary_detail,
    },
];

/// Picks the best available body for `entry`, or an empty string when no
/// rule applies.
pub fn resolve_content(entry: &RawFeedEntry) -> String {
    resolve_content_with_rule(entry)
        .map(|(_, body)| body)
        .unwrap_or_default()
}

/// Like [`resolve_content`] but also reports which rule matched.
pub fn resolve_content_with_rule(entry: &RawFeedEntry) -> Option<(&'static str, String)> {
    CONTENT_RULES
        .iter()
        .find_map(|rule| (rule.extract)(entry).map(|body| (rule.name, body)))
}

/// First value of the structured content block, when non-empty.
pub fn content_block(entry: &RawFeedEntry) -> Option<String> {
    entry
        .path(path!["content", 0, "value"])
        .filter(|v| v.is_truthy())
        .map(RawValue::to_text)
}

/// Generic full-text field. The key being present is enough to match; when
/// both spellings are present the first non-empty one is used.
pub fn full_text(entry: &RawFeedEntry) -> Option<String> {
    if !entry.contains_key("full-text") && !entry.contains_key("fulltext") {
        return None;
    }
    let body = ["full-text", "fulltext"]
        .iter()
        .filter_map(|key| entry.get(key))
        .find(|v| v.is_truthy())
        .map(RawValue::to_text)
        .unwrap_or_default();
    Some(body)
}

/// Yandex-namespaced full-text field, under either spelling the feed
/// libraries produce for it.
pub fn vendor_full_text(entry: &RawFeedEntry) -> Option<String> {
    ["yandex_full-text", "yandex:full-text"]
        .iter()
        .find_map(|key| entry.get(key))
        .map(RawValue::to_text)
}

/// The summary detail value. Summaries not declared as HTML are escaped so
/// that the sanitizer keeps their literal `<`/`&` characters.
pub fn summary_detail(entry: &RawFeedEntry) -> Option<String> {
    let value = entry
        .path(path!["summary_detail", "value"])
        .filter(|v| v.is_truthy())?
        .to_text();

    let is_html = entry
        .path(path!["summary_detail", "type"])
        .and_then(RawValue::as_str)
        == Some(HTML_CONTENT_TYPE);

    if is_html {
        Some(value)
    } else {
        Some(escape_text(&value).into_owned())
    }
}
