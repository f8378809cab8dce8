//! Converts a `feed-rs` document into raw records.
//!
//! This is the only place that knows the `feed-rs` object model. Everything
//! downstream sees the same keyed shape regardless of whether the feed was
//! RSS 0.9x/1.0/2.0, Atom or JSON Feed.

use super::fetcher::FetchError;
use super::raw::{RawFeedEntry, RawFeedMeta, RawValue};
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use std::collections::BTreeMap;

/// Parses `bytes` and returns the entries plus feed-level metadata.
///
/// `last_modified` is the raw `Last-Modified` response header, if any.
pub fn adapt_feed(
    bytes: &[u8],
    last_modified: Option<&str>,
) -> Result<(Vec<RawFeedEntry>, RawFeedMeta), FetchError> {
    let feed = parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
    let entries = feed.entries.iter().map(adapt_entry).collect();
    Ok((entries, feed_meta(&feed, last_modified)))
}

fn feed_meta(feed: &Feed, last_modified: Option<&str>) -> RawFeedMeta {
    let mut meta = RawFeedMeta::new();
    if let Some(header) = last_modified {
        meta.insert("modified", header);
        if let Ok(parsed) = DateTime::parse_from_rfc2822(header) {
            meta.insert("modified_parsed", parsed.with_timezone(&Utc));
        }
    }
    if let Some(updated) = feed.updated {
        meta.insert("updated_parsed", updated);
    }
    meta
}

fn adapt_entry(entry: &Entry) -> RawFeedEntry {
    let mut raw = RawFeedEntry::new();

    if !entry.id.is_empty() {
        raw.insert("id", entry.id.as_str());
    }
    if let Some(link) = entry.links.first() {
        raw.insert("link", link.href.as_str());
    }
    if let Some(title) = &entry.title {
        raw.insert("title", title.content.as_str());
    }
    if let Some(summary) = &entry.summary {
        raw.insert("summary", summary.content.as_str());
        raw.insert(
            "summary_detail",
            detail(&summary.content, &summary.content_type.essence().to_string()),
        );
    }
    if let Some(body) = entry.content.as_ref().and_then(|c| {
        c.body
            .as_deref()
            .map(|body| detail(body, &c.content_type.essence().to_string()))
    }) {
        raw.insert("content", RawValue::List(vec![body]));
    }
    if !entry.categories.is_empty() {
        let tags = entry
            .categories
            .iter()
            .map(|category| {
                let mut tag = BTreeMap::new();
                tag.insert("term".to_string(), RawValue::from(category.term.as_str()));
                RawValue::Map(tag)
            })
            .collect::<Vec<_>>();
        raw.insert("tags", tags);
    }
    if let Some(published) = entry.published.or(entry.updated) {
        raw.insert("published_parsed", published);
    }

    raw
}

fn detail(value: &str, content_type: &str) -> RawValue {
    let mut map = BTreeMap::new();
    map.insert("value".to_string(), RawValue::from(value));
    map.insert("type".to_string(), RawValue::from(content_type));
    RawValue::Map(map)
}
