use super::content::resolve_content;
use super::raw::{RawFeedEntry, RawValue};
use super::types::Post;
use crate::sanitize::{sanitize, sanitize_display};
use std::collections::BTreeSet;
use thiserror::Error;

/// Why an entry has no usable publication time.
///
/// Feeds are assumed to be in chronological order, so the parser stops
/// consuming a fetch at the first entry that reports this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("entry has no published_parsed field")]
    MissingPublished,
    #[error("published_parsed is not a structured time: {0}")]
    InvalidPublished(String),
}

/// Why an otherwise valid entry was not emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Published after the current time.
    Future { published: i64, now: i64 },
    /// Published at or before the stored watermark.
    AlreadySeen { published: i64, watermark: i64 },
}

/// The outcome of normalizing one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Post(Post),
    Skip(SkipReason),
}

/// Converts one raw entry into a [`Post`].
///
/// `watermark` is the newest publication time the caller has already seen;
/// a watermark of `0` counts as unset. `now` is the current Unix time.
///
/// # Errors
///
/// Returns a [`MalformedReason`] when the entry has no usable
/// `published_parsed` value.
pub fn normalize(
    entry: &RawFeedEntry,
    feed_hash: &str,
    watermark: Option<i64>,
    now: i64,
) -> Result<Normalized, MalformedReason> {
    let published = published_timestamp(entry)?;

    if published > now {
        return Ok(Normalized::Skip(SkipReason::Future { published, now }));
    }

    if let Some(watermark) = watermark.filter(|w| *w != 0) {
        if published <= watermark {
            return Ok(Normalized::Skip(SkipReason::AlreadySeen {
                published,
                watermark,
            }));
        }
    }

    let title = entry.title().map(sanitize_display).unwrap_or_default();
    let summary = entry
        .summary()
        .filter(|s| s.is_truthy())
        .map(sanitize_display)
        .unwrap_or_default();

    let mut content = sanitize(&resolve_content(entry));
    if content == summary {
        content.clear();
    }

    let tags = entry.tags().map(collect_tags);

    Ok(Normalized::Post(Post {
        url: entry.link().map(str::to_string),
        feed_hash: feed_hash.to_string(),
        published,
        title,
        summary,
        content,
        tags,
    }))
}

fn published_timestamp(entry: &RawFeedEntry) -> Result<i64, MalformedReason> {
    let value = entry.published().ok_or(MalformedReason::MissingPublished)?;
    value
        .to_timestamp()
        .ok_or_else(|| MalformedReason::InvalidPublished(value.to_string()))
}

/// Sanitized, deduplicated tag terms. Tags may be `{term: ...}` maps or bare
/// strings; tags without a term are ignored.
fn collect_tags(tags: &[RawValue]) -> BTreeSet<String> {
    tags.iter()
        .filter_map(|tag| match tag.as_map() {
            Some(map) => map.get("term").filter(|t| !matches!(t, RawValue::Null)),
            None if matches!(tag, RawValue::Null) => None,
            None => Some(tag),
        })
        .map(sanitize_display)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn entry(value: serde_json::Value) -> RawFeedEntry {
        RawFeedEntry::from_json(value).unwrap()
    }

    fn expect_post(result: Result<Normalized, MalformedReason>) -> Post {
        match result {
            Ok(Normalized::Post(post)) => post,
            other => panic!("expected a post, got {:?}", other),
        }
    }

    #[test]
    fn test_full_entry_normalized() {
        let e = entry(json!({
            "link": "https://example.com/1",
            "title": "  <b>Hello</b>   world ",
            "summary": "<p>Short &amp; sweet</p>",
            "content": [{"value": "<div>\n  <p>Long body</p>\n</div>"}],
            "tags": [{"term": "rust"}, {"term": "<i>news</i>"}, {"term": "rust"}],
            "published_parsed": "2023-11-14T22:00:00Z",
        }));

        let post = expect_post(normalize(&e, "hash", None, NOW));
        assert_eq!(post.url.as_deref(), Some("https://example.com/1"));
        assert_eq!(post.feed_hash, "hash");
        assert_eq!(post.published, 1699999200);
        assert_eq!(post.title, " Hello world ");
        assert_eq!(post.summary, "Short & sweet");
        assert_eq!(post.content, "Long body");
        assert_eq!(
            post.tags,
            Some(BTreeSet::from(["news".to_string(), "rust".to_string()]))
        );
    }

    #[test]
    fn test_content_equal_to_summary_is_cleared() {
        let e = entry(json!({
            "title": "t",
            "summary": "<p>Same text</p>",
            "summary_detail": {"value": "<p>Same text</p>", "type": "text/html"},
            "published_parsed": "2023-11-14T22:00:00Z",
        }));
        let post = expect_post(normalize(&e, "h", None, NOW));
        assert_eq!(post.summary, "Same text");
        assert_eq!(post.content, "");
    }

    #[test]
    fn test_plain_text_summary_dedups_after_escape() {
        let e = entry(json!({
            "title": "t",
            "summary": "Fish & chips",
            "summary_detail": {"value": "Fish & chips", "type": "text/plain"},
            "published_parsed": "2023-11-14T22:00:00Z",
        }));
        let post = expect_post(normalize(&e, "h", None, NOW));
        assert_eq!(post.summary, "Fish & chips");
        assert_eq!(post.content, "");
    }

    #[test]
    fn test_missing_published_is_malformed() {
        let e = entry(json!({"title": "t"}));
        assert_eq!(
            normalize(&e, "h", None, NOW),
            Err(MalformedReason::MissingPublished)
        );
    }

    #[test]
    fn test_unparseable_published_is_malformed() {
        let e = entry(json!({"title": "t", "published_parsed": "last tuesday"}));
        assert!(matches!(
            normalize(&e, "h", None, NOW),
            Err(MalformedReason::InvalidPublished(_))
        ));
    }

    #[test]
    fn test_future_entry_skipped() {
        let e = entry(json!({"title": "t", "published_parsed": "2030-01-01T00:00:00Z"}));
        assert!(matches!(
            normalize(&e, "h", None, NOW),
            Ok(Normalized::Skip(SkipReason::Future { .. }))
        ));
    }

    #[test]
    fn test_entry_at_watermark_skipped() {
        let e = entry(json!({"title": "t", "published_parsed": "2023-11-14T22:00:00Z"}));
        assert_eq!(
            normalize(&e, "h", Some(1699999200), NOW),
            Ok(Normalized::Skip(SkipReason::AlreadySeen {
                published: 1699999200,
                watermark: 1699999200,
            }))
        );
        assert!(matches!(
            normalize(&e, "h", Some(1699999199), NOW),
            Ok(Normalized::Post(_))
        ));
    }

    #[test]
    fn test_zero_watermark_counts_as_unset() {
        let e = entry(json!({"title": "t", "published_parsed": "2023-11-14T22:00:00Z"}));
        assert!(matches!(
            normalize(&e, "h", Some(0), NOW),
            Ok(Normalized::Post(_))
        ));
    }

    #[test]
    fn test_missing_optional_fields() {
        let e = entry(json!({"published_parsed": "2023-11-14T22:00:00Z"}));
        let post = expect_post(normalize(&e, "h", None, NOW));
        assert_eq!(post.url, None);
        assert_eq!(post.title, "");
        assert_eq!(post.summary, "");
        assert_eq!(post.content, "");
        assert_eq!(post.tags, None);
    }

    #[test]
    fn test_tags_accept_bare_and_numeric_terms() {
        let e = entry(json!({
            "published_parsed": "2023-11-14T22:00:00Z",
            "tags": ["plain", {"term": 2024}, {"label": "no term"}],
        }));
        let post = expect_post(normalize(&e, "h", None, NOW));
        assert_eq!(
            post.tags,
            Some(BTreeSet::from(["2024".to_string(), "plain".to_string()]))
        );
    }
}
