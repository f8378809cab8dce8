//! Feed normalization: from raw RSS/Atom entries to deduplicated posts.
//!
//! - [`raw`] - Raw entry records and the nested-lookup helper
//! - [`content`] - Ordered rules that pick an entry's body text
//! - [`normalizer`] - One raw entry to one [`Post`]
//! - [`parser`] - Conditional fetch, watermark tracking and interval stats
//! - [`fetcher`] - The fetch collaborator and its HTTP implementation
//! - [`adapter`] - `feed-rs` documents to raw records
//!
//! # Example
//!
//! ```ignore
//! use feedsift::feed::{FeedParser, FeedSource, HttpFetcher};
//!
//! let parser = FeedParser::new(HttpFetcher::new(reqwest::Client::new(), &config));
//! let mut source = FeedSource::new("https://example.com/feed.xml");
//! let result = parser.parse(&source).await?;
//! source.apply(&result);
//! ```

pub mod adapter;
pub mod content;
pub mod fetcher;
pub mod normalizer;
pub mod parser;
pub mod raw;
mod source;
mod types;

pub use adapter::adapt_feed;
pub use content::{resolve_content, ContentRule, CONTENT_RULES};
pub use fetcher::{ConditionalRequest, FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use normalizer::{normalize, MalformedReason, Normalized, SkipReason};
pub use parser::{
    assemble, declared_modified, median_interval, Clock, FeedError, FeedParser, MalformedEntry,
    ParseObserver, ParseSettings, SystemClock, TracingObserver,
};
pub use raw::{get_path, PathKey, RawFeedEntry, RawFeedMeta, RawRecord, RawValue};
pub use source::FeedSource;
pub use types::{ParseResult, Post};
