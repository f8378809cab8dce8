use crate::config::Config;
use crate::feed::adapter::adapt_feed;
use crate::feed::raw::{RawFeedEntry, RawFeedMeta};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::Instant;
use thiserror::Error;

/// Errors that can occur while fetching a feed.
///
/// These are passed through `parse` unchanged; the normalizer never wraps or
/// retries them.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a non-2xx, non-304 status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// How to make the fetch conditional on the previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalRequest {
    None,
    /// Send the etag from the last successful fetch.
    ETag(String),
    /// Ask only for changes after this time.
    ModifiedSince(DateTime<Utc>),
}

impl ConditionalRequest {
    /// ISO-8601 rendering of the `ModifiedSince` time.
    pub fn iso(&self) -> Option<String> {
        match self {
            ConditionalRequest::ModifiedSince(since) => {
                Some(since.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            _ => None,
        }
    }
}

/// What a fetch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResponse {
    /// HTTP status when known. `304` means "not modified".
    pub status: Option<u16>,
    pub etag: Option<String>,
    pub entries: Vec<RawFeedEntry>,
    /// Feed-level fields: `modified`, `modified_parsed`, `updated_parsed`.
    pub feed: RawFeedMeta,
}

impl FetchResponse {
    pub fn not_modified() -> Self {
        Self {
            status: Some(StatusCode::NOT_MODIFIED.as_u16()),
            ..Self::default()
        }
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == Some(StatusCode::NOT_MODIFIED.as_u16())
    }
}

/// Retrieves a feed and hands back its raw entries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        conditional: &ConditionalRequest,
    ) -> Result<FetchResponse, FetchError>;
}

/// HTTP fetcher backed by `reqwest` and `feed-rs`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
    max_feed_bytes: usize,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_feed_bytes: config.max_feed_bytes,
            max_retries: config.max_retries,
        }
    }

    fn request(&self, url: &str, conditional: &ConditionalRequest) -> reqwest::RequestBuilder {
        let request = self.client.get(url).header(USER_AGENT, &self.user_agent);
        match conditional {
            ConditionalRequest::None => request,
            ConditionalRequest::ETag(etag) => request.header(IF_NONE_MATCH, etag),
            ConditionalRequest::ModifiedSince(since) => {
                request.header(IF_MODIFIED_SINCE, http_date(since))
            }
        }
    }

    async fn backoff(&self, retry_count: u32) {
        tokio::time::sleep(Duration::from_secs(backoff_delay_secs(retry_count))).await;
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        conditional: &ConditionalRequest,
    ) -> Result<FetchResponse, FetchError> {
        let mut retry_count = 0;
        tracing::debug!(feed = %url, since = ?conditional.iso(), "Fetching feed");

        let (etag, last_modified, bytes) = loop {
            // One deadline covers both the headers and the body.
            let deadline = Instant::now() + self.timeout;
            let response = tokio::time::timeout_at(deadline, self.request(url, conditional).send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;

            let status = response.status();

            if status == StatusCode::NOT_MODIFIED {
                tracing::debug!(feed = %url, "Feed not modified");
                let mut not_modified = FetchResponse::not_modified();
                not_modified.etag = header_string(&response, ETAG);
                return Ok(not_modified);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= self.max_retries {
                    return Err(FetchError::RateLimited(self.max_retries));
                }
                tracing::warn!(
                    feed = %url,
                    retry = retry_count,
                    delay_secs = backoff_delay_secs(retry_count),
                    "Rate limited, backing off"
                );
                self.backoff(retry_count).await;
                retry_count += 1;
                continue;
            }

            if status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(FetchError::HttpStatus(status.as_u16()));
                }
                tracing::warn!(
                    feed = %url,
                    status = %status,
                    retry = retry_count,
                    delay_secs = backoff_delay_secs(retry_count),
                    "Server error, retrying after delay"
                );
                self.backoff(retry_count).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let etag = header_string(&response, ETAG);
            let last_modified = header_string(&response, LAST_MODIFIED);

            let body = tokio::time::timeout_at(
                deadline,
                read_limited_bytes(response, self.max_feed_bytes),
            )
            .await
            .map_err(|_| FetchError::Timeout)?;

            match body {
                Ok(bytes) => break (etag, last_modified, bytes),
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= self.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }
                    tracing::debug!(
                        feed = %url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        delay_secs = backoff_delay_secs(retry_count),
                        "Retrying incomplete download"
                    );
                    self.backoff(retry_count).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        let (entries, feed) = adapt_feed(&bytes, last_modified.as_deref())?;
        tracing::debug!(feed = %url, entries = entries.len(), "Fetched feed");

        Ok(FetchResponse {
            status: Some(StatusCode::OK.as_u16()),
            etag,
            entries,
            feed,
        })
    }
}

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF_SECS: u64 = 60;

/// 1s, 2s, 4s, ... capped at [`MAX_BACKOFF_SECS`].
fn backoff_delay_secs(retry_count: u32) -> u64 {
    2u64.checked_pow(retry_count)
        .map_or(MAX_BACKOFF_SECS, |secs| secs.min(MAX_BACKOFF_SECS))
}

/// RFC 7231 HTTP-date, as expected by `If-Modified-Since`.
fn http_date(since: &DateTime<Utc>) -> String {
    since.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match (chunk, expected_length) {
            (Ok(chunk), _) => chunk,
            // Connection dropped before the declared length arrived.
            (Err(_), Some(expected)) if (bytes.len() as u64) < expected => {
                return Err(FetchError::IncompleteResponse {
                    expected,
                    received: bytes.len(),
                });
            }
            (Err(e), _) => return Err(FetchError::Network(e)),
        };
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
