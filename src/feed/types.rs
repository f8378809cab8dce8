use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A normalized post, created once per accepted feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub url: Option<String>,
    /// Content hash of the feed URL the post came from.
    pub feed_hash: String,
    /// Unix timestamp (seconds) of publication.
    pub published: i64,
    pub title: String,
    pub summary: String,
    /// Plain-text body. Empty when it would only repeat the summary.
    pub content: String,
    /// Sanitized tag terms. Present only when the entry carried tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

/// The outcome of one parse of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    /// New modification watermark to store on the feed source.
    pub next_modified: i64,
    /// Conditional-fetch token to send next time.
    pub etag: Option<String>,
    /// Median gap between consecutive accepted posts, in seconds.
    pub interval_seconds: Option<i64>,
    /// Posts in feed order.
    pub posts: Vec<Post>,
}
