use super::fetcher::ConditionalRequest;
use super::types::ParseResult;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// A feed to parse, with the conditional-fetch state from the previous run.
///
/// The caller persists `etag` and `modified` between runs (see
/// [`FeedSource::apply`]). One source must not be parsed by two callers at
/// the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    url: String,
    pub etag: Option<String>,
    /// Unix timestamp of the newest post already known.
    pub modified: Option<i64>,
}

impl FeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            etag: None,
            modified: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_modified(mut self, modified: i64) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stable identifier of the feed: hex MD5 of its URL, exactly as given.
    pub fn content_hash(&self) -> String {
        format!("{:x}", md5::compute(self.url.as_bytes()))
    }

    /// The conditional request to send: the etag when there is one,
    /// otherwise the watermark, otherwise an unconditional fetch. An empty
    /// etag and a zero watermark count as absent.
    pub fn conditional_request(&self) -> ConditionalRequest {
        if let Some(etag) = self.etag.as_deref().filter(|e| !e.is_empty()) {
            return ConditionalRequest::ETag(etag.to_string());
        }
        match self
            .modified
            .filter(|m| *m != 0)
            .and_then(|m| DateTime::from_timestamp(m, 0))
        {
            Some(since) => ConditionalRequest::ModifiedSince(since),
            None => ConditionalRequest::None,
        }
    }

    /// Stores the state from a successful parse. The watermark only ever
    /// moves forward.
    pub fn apply(&mut self, result: &ParseResult) {
        if result.etag.is_some() {
            self.etag = result.etag.clone();
        }
        self.modified = Some(
            self.modified
                .map_or(result.next_modified, |m| m.max(result.next_modified)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(next_modified: i64, etag: Option<&str>) -> ParseResult {
        ParseResult {
            next_modified,
            etag: etag.map(str::to_string),
            interval_seconds: None,
            posts: Vec::new(),
        }
    }

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = FeedSource::new("https://example.com/feed.xml");
        let b = FeedSource::new("https://example.com/feed.xml").with_etag("x");
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 32);
        assert_ne!(a.content_hash(), FeedSource::new("https://other.example/").content_hash());
    }

    #[test]
    fn test_content_hash_is_md5_of_url() {
        assert_eq!(
            FeedSource::new("https://example.com/feed.xml").content_hash(),
            "f7880620c8c1d31d1b57c3edde9deffa"
        );
        // No normalization: a trailing slash is a different feed.
        assert_ne!(
            FeedSource::new("https://example.com").content_hash(),
            FeedSource::new("https://example.com/").content_hash()
        );
    }

    #[test]
    fn test_conditional_prefers_etag() {
        let source = FeedSource::new("u").with_etag("\"abc\"").with_modified(1_700_000_000);
        assert_eq!(
            source.conditional_request(),
            ConditionalRequest::ETag("\"abc\"".to_string())
        );
    }

    #[test]
    fn test_conditional_falls_back_to_modified() {
        let source = FeedSource::new("u").with_etag("").with_modified(1_700_000_000);
        match source.conditional_request() {
            ConditionalRequest::ModifiedSince(since) => {
                assert_eq!(since.timestamp(), 1_700_000_000)
            }
            other => panic!("expected ModifiedSince, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional_unconditional_when_empty() {
        assert_eq!(FeedSource::new("u").conditional_request(), ConditionalRequest::None);
        assert_eq!(
            FeedSource::new("u").with_modified(0).conditional_request(),
            ConditionalRequest::None
        );
    }

    #[test]
    fn test_apply_never_lowers_watermark() {
        let mut source = FeedSource::new("u").with_modified(200);
        source.apply(&result(100, Some("e1")));
        assert_eq!(source.modified, Some(200));
        assert_eq!(source.etag.as_deref(), Some("e1"));

        source.apply(&result(300, None));
        assert_eq!(source.modified, Some(300));
        assert_eq!(source.etag.as_deref(), Some("e1"));
    }
}
