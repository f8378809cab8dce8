//! Normalizes RSS/Atom feeds into stable, deduplicated plain-text posts.
//!
//! - [`sanitize`] - HTML-to-plaintext conversion
//! - [`feed`] - Entry normalization, conditional fetching and watermark tracking
//! - [`config`] - Optional TOML configuration

pub mod config;
pub mod feed;
pub mod sanitize;

pub use config::{Config, ConfigError};
pub use feed::{FeedError, FeedParser, FeedSource, HttpFetcher, ParseResult, Post};
pub use sanitize::sanitize;
