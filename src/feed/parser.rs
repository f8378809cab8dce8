use super::fetcher::{FetchError, FetchResponse, Fetcher};
use super::normalizer::{normalize, MalformedReason, Normalized, SkipReason};
use super::raw::{RawFeedMeta, RawValue};
use super::source::FeedSource;
use super::types::ParseResult;
use crate::config::Config;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by [`FeedParser::parse`].
#[derive(Debug, Error)]
pub enum FeedError {
    /// The conditional fetch found no change. Not a failure: there is simply
    /// nothing new, and the source state must be left as it is.
    #[error("Feed not modified")]
    NotModified,
    /// The fetch itself failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl FeedError {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, FeedError::NotModified)
    }
}

/// An entry without a usable publication time. Parsing of the fetch stopped
/// at this entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntry {
    pub feed_url: String,
    /// Position of the entry in the fetched feed.
    pub index: usize,
    pub reason: MalformedReason,
}

/// Receives events that do not change the result but are worth reporting.
pub trait ParseObserver: Send + Sync {
    fn malformed_entry(&self, event: &MalformedEntry);

    fn entry_skipped(&self, _feed_url: &str, _index: usize, _reason: &SkipReason) {}
}

/// Reports parse events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ParseObserver for TracingObserver {
    fn malformed_entry(&self, event: &MalformedEntry) {
        tracing::warn!(
            feed = %event.feed_url,
            index = event.index,
            reason = %event.reason,
            "Malformed entry, ignoring the rest of the feed"
        );
    }

    fn entry_skipped(&self, feed_url: &str, index: usize, reason: &SkipReason) {
        tracing::debug!(feed = %feed_url, index = index, reason = ?reason, "Entry skipped");
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Tunables for the aggregate statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseSettings {
    /// Seconds subtracted from "now" when the feed declares no modification
    /// time.
    pub modified_fallback_secs: i64,
    /// Minimum number of gaps before an interval is reported.
    pub min_interval_gaps: usize,
}

impl Default for ParseSettings {
    fn default() -> Self {
        Self {
            modified_fallback_secs: 100,
            min_interval_gaps: 3,
        }
    }
}

impl From<&Config> for ParseSettings {
    fn from(config: &Config) -> Self {
        Self {
            modified_fallback_secs: config.modified_fallback_secs,
            min_interval_gaps: config.min_interval_gaps,
        }
    }
}

/// Fetches a feed and normalizes its entries.
///
/// # Example
///
/// ```ignore
/// let parser = FeedParser::new(HttpFetcher::new(client, &config)).with_settings((&config).into());
/// match parser.parse(&source).await {
///     Ok(result) => source.apply(&result),
///     Err(e) if e.is_not_modified() => {}
///     Err(e) => return Err(e.into()),
/// }
/// ```
pub struct FeedParser<F> {
    fetcher: F,
    observer: Arc<dyn ParseObserver>,
    clock: Arc<dyn Clock>,
    settings: ParseSettings,
}

impl<F: Fetcher> FeedParser<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            observer: Arc::new(TracingObserver),
            clock: Arc::new(SystemClock),
            settings: ParseSettings::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ParseObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: ParseSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Fetches `source` conditionally and builds the [`ParseResult`].
    ///
    /// `source` is not modified; store the result with
    /// [`FeedSource::apply`].
    ///
    /// # Errors
    ///
    /// - [`FeedError::NotModified`] when the server reports no change
    /// - [`FeedError::Fetch`] when the fetch fails
    pub async fn parse(&self, source: &FeedSource) -> Result<ParseResult, FeedError> {
        let conditional = source.conditional_request();
        let response = self.fetcher.fetch(source.url(), &conditional).await?;

        if response.is_not_modified() {
            return Err(FeedError::NotModified);
        }

        let now = self.clock.now().timestamp();
        let result = assemble(source, response, now, self.observer.as_ref(), &self.settings);

        tracing::debug!(
            feed = %source.url(),
            posts = result.posts.len(),
            next_modified = result.next_modified,
            interval = ?result.interval_seconds,
            "Feed parsed"
        );

        Ok(result)
    }
}

/// Builds the [`ParseResult`] for an already fetched, modified response.
pub fn assemble(
    source: &FeedSource,
    response: FetchResponse,
    now: i64,
    observer: &dyn ParseObserver,
    settings: &ParseSettings,
) -> ParseResult {
    let feed_hash = source.content_hash();
    let etag = response.etag.or_else(|| source.etag.clone());

    let mut posts = Vec::new();
    let mut gaps = Vec::new();
    let mut previous: Option<i64> = None;
    let mut latest_post_timestamp = 0;

    for (index, entry) in response.entries.iter().enumerate() {
        match normalize(entry, &feed_hash, source.modified, now) {
            Ok(Normalized::Post(post)) => {
                latest_post_timestamp = latest_post_timestamp.max(post.published);
                if let Some(prev) = previous {
                    gaps.push((prev - post.published).abs());
                }
                previous = Some(post.published);
                posts.push(post);
            }
            Ok(Normalized::Skip(reason)) => observer.entry_skipped(source.url(), index, &reason),
            Err(reason) => {
                observer.malformed_entry(&MalformedEntry {
                    feed_url: source.url().to_string(),
                    index,
                    reason,
                });
                break;
            }
        }
    }

    let declared = declared_modified(&response.feed, now, settings.modified_fallback_secs);
    let next_modified = declared
        .max(latest_post_timestamp)
        .max(source.modified.unwrap_or(0));

    ParseResult {
        next_modified,
        etag,
        interval_seconds: median_interval(gaps, settings.min_interval_gaps),
        posts,
    }
}

/// Median of the gaps between consecutive posts, or `None` with fewer than
/// `min_gaps` gaps.
///
/// The element at index `len / 2` of the sorted gaps is used, so an even
/// count picks the upper of the two middle values rather than averaging.
pub fn median_interval(mut gaps: Vec<i64>, min_gaps: usize) -> Option<i64> {
    if gaps.is_empty() || gaps.len() < min_gaps {
        return None;
    }
    gaps.sort_unstable();
    Some(gaps[gaps.len() / 2])
}

/// The feed's own modification time: an explicit integer `modified`, then
/// `modified_parsed`, then `updated_parsed`, then `now - fallback_secs`.
pub fn declared_modified(meta: &RawFeedMeta, now: i64, fallback_secs: i64) -> i64 {
    if let Some(RawValue::Int(modified)) = meta.get("modified") {
        return *modified;
    }
    ["modified_parsed", "updated_parsed"]
        .iter()
        .find_map(|key| meta.get(key).and_then(RawValue::to_timestamp))
        .unwrap_or(now - fallback_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::ConditionalRequest;
    use crate::feed::raw::RawFeedEntry;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    const NOW: i64 = 1_700_000_000;

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp(self.0, 0).unwrap()
        }
    }

    #[derive(Default)]
    struct Recorder {
        malformed: Mutex<Vec<MalformedEntry>>,
        skipped: Mutex<Vec<(usize, SkipReason)>>,
    }

    impl ParseObserver for Recorder {
        fn malformed_entry(&self, event: &MalformedEntry) {
            self.malformed.lock().unwrap().push(event.clone());
        }

        fn entry_skipped(&self, _feed_url: &str, index: usize, reason: &SkipReason) {
            self.skipped.lock().unwrap().push((index, *reason));
        }
    }

    struct StubFetcher {
        response: FetchResponse,
        seen: Mutex<Vec<ConditionalRequest>>,
    }

    impl StubFetcher {
        fn new(response: FetchResponse) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(
            &self,
            _url: &str,
            conditional: &ConditionalRequest,
        ) -> Result<FetchResponse, FetchError> {
            self.seen.lock().unwrap().push(conditional.clone());
            Ok(self.response.clone())
        }
    }

    fn entry_at(ts: i64) -> RawFeedEntry {
        RawFeedEntry::from_json(json!({
            "link": format!("https://example.com/{}", ts),
            "title": format!("Post {}", ts),
            "published_parsed": DateTime::from_timestamp(ts, 0).unwrap().to_rfc3339(),
        }))
        .unwrap()
    }

    fn response(entries: Vec<RawFeedEntry>) -> FetchResponse {
        FetchResponse {
            status: Some(200),
            etag: None,
            entries,
            feed: RawFeedMeta::new(),
        }
    }

    fn parser(response: FetchResponse) -> FeedParser<StubFetcher> {
        FeedParser::new(StubFetcher::new(response)).with_clock(Arc::new(FixedClock(NOW)))
    }

    #[test]
    fn test_median_interval() {
        assert_eq!(median_interval(vec![30, 10, 20], 3), Some(20));
        assert_eq!(median_interval(vec![10, 20], 3), None);
        assert_eq!(median_interval(vec![], 0), None);
        // Even count: index len / 2 of the sorted gaps.
        assert_eq!(median_interval(vec![40, 10, 30, 20], 3), Some(30));
    }

    #[test]
    fn test_declared_modified_precedence() {
        let all = RawFeedMeta::new()
            .with("modified", 500i64)
            .with("modified_parsed", "1970-01-01T00:10:00Z")
            .with("updated_parsed", "1970-01-01T00:20:00Z");
        assert_eq!(declared_modified(&all, NOW, 100), 500);

        let textual = RawFeedMeta::new()
            .with("modified", "Thu, 01 Jan 1970 00:10:00 GMT")
            .with("modified_parsed", "1970-01-01T00:10:00Z")
            .with("updated_parsed", "1970-01-01T00:20:00Z");
        assert_eq!(declared_modified(&textual, NOW, 100), 600);

        let updated_only = RawFeedMeta::new().with("updated_parsed", "1970-01-01T00:20:00Z");
        assert_eq!(declared_modified(&updated_only, NOW, 100), 1200);

        assert_eq!(declared_modified(&RawFeedMeta::new(), NOW, 100), NOW - 100);
    }

    #[tokio::test]
    async fn test_parse_collects_posts_and_interval() {
        let entries = vec![
            entry_at(NOW - 100),
            entry_at(NOW - 110),
            entry_at(NOW - 130),
            entry_at(NOW - 160),
        ];
        let result = parser(response(entries))
            .parse(&FeedSource::new("https://example.com/feed"))
            .await
            .unwrap();

        assert_eq!(result.posts.len(), 4);
        assert_eq!(result.interval_seconds, Some(20));
        // No declared time: now - 100 equals the newest post.
        assert_eq!(result.next_modified, NOW - 100);
        assert_eq!(result.posts[0].published, NOW - 100);
        assert_eq!(
            result.posts[0].feed_hash,
            FeedSource::new("https://example.com/feed").content_hash()
        );
    }

    #[tokio::test]
    async fn test_fewer_than_three_gaps_has_no_interval() {
        let entries = vec![entry_at(NOW - 10), entry_at(NOW - 20), entry_at(NOW - 40)];
        let result = parser(response(entries))
            .parse(&FeedSource::new("u"))
            .await
            .unwrap();
        assert_eq!(result.interval_seconds, None);
    }

    #[tokio::test]
    async fn test_not_modified_is_signalled() {
        let source = FeedSource::new("u").with_etag("\"v1\"").with_modified(NOW - 500);
        let stub = parser(FetchResponse::not_modified());
        let err = stub.parse(&source).await.unwrap_err();

        assert!(err.is_not_modified());
        assert_eq!(source.etag.as_deref(), Some("\"v1\""));
        assert_eq!(source.modified, Some(NOW - 500));
        assert_eq!(
            stub.fetcher.seen.lock().unwrap().as_slice(),
            &[ConditionalRequest::ETag("\"v1\"".to_string())]
        );
    }

    #[tokio::test]
    async fn test_etag_retained_when_response_has_none() {
        let source = FeedSource::new("u").with_etag("\"old\"");
        let result = parser(response(vec![])).parse(&source).await.unwrap();
        assert_eq!(result.etag.as_deref(), Some("\"old\""));

        let mut fresh = response(vec![]);
        fresh.etag = Some("\"new\"".to_string());
        let result = parser(fresh).parse(&source).await.unwrap();
        assert_eq!(result.etag.as_deref(), Some("\"new\""));
    }

    #[tokio::test]
    async fn test_malformed_entry_stops_processing() {
        let undated = RawFeedEntry::from_json(json!({"title": "no date"})).unwrap();
        let entries = vec![entry_at(NOW - 10), undated, entry_at(NOW - 30)];
        let recorder = Arc::new(Recorder::default());

        let result = parser(response(entries))
            .with_observer(recorder.clone())
            .parse(&FeedSource::new("u"))
            .await
            .unwrap();

        assert_eq!(result.posts.len(), 1);
        let malformed = recorder.malformed.lock().unwrap();
        assert_eq!(malformed.len(), 1);
        assert_eq!(malformed[0].index, 1);
        assert_eq!(malformed[0].reason, MalformedReason::MissingPublished);
    }

    #[tokio::test]
    async fn test_future_and_seen_entries_skipped() {
        let entries = vec![
            entry_at(NOW + 3600),
            entry_at(NOW - 10),
            entry_at(NOW - 20),
            entry_at(NOW - 30),
        ];
        let recorder = Arc::new(Recorder::default());
        let source = FeedSource::new("u").with_modified(NOW - 20);

        let result = parser(response(entries))
            .with_observer(recorder.clone())
            .parse(&source)
            .await
            .unwrap();

        assert_eq!(result.posts.len(), 1);
        assert_eq!(result.posts[0].published, NOW - 10);
        let skipped = recorder.skipped.lock().unwrap();
        assert_eq!(skipped.len(), 3);
        assert!(matches!(skipped[0], (0, SkipReason::Future { .. })));
        assert!(matches!(skipped[1], (2, SkipReason::AlreadySeen { .. })));
    }

    #[tokio::test]
    async fn test_watermark_never_decreases() {
        let mut meta = RawFeedMeta::new();
        meta.insert("updated_parsed", "2000-01-01T00:00:00Z");
        let stale = FetchResponse {
            status: Some(200),
            etag: None,
            entries: vec![],
            feed: meta,
        };
        let source = FeedSource::new("u").with_modified(NOW - 50);
        let result = parser(stale).parse(&source).await.unwrap();
        assert_eq!(result.next_modified, NOW - 50);
    }

    #[tokio::test]
    async fn test_latest_post_beats_declared_modified() {
        let mut with_meta = response(vec![entry_at(NOW - 5)]);
        with_meta.feed.insert("modified", NOW - 1000);
        let result = parser(with_meta).parse(&FeedSource::new("u")).await.unwrap();
        assert_eq!(result.next_modified, NOW - 5);
    }
}
