//! HTTP feed source for published IP-range documents.
//!
//! The feed is a JSON document of the shape
//! `{ "items": [{ "cidr": "...", "product": [...], "direction": [...] }] }`.
//! Entries are filtered to the configured service and direction before the
//! canonicalizer sees them. IPv6 entries are skipped here (with a logged
//! count) and never mixed into the IPv4 set.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Timeout for the feed request.
const TIMEOUT_SECS: u64 = 10;

/// Maximum feed size (4 MB). Real range feeds are a few hundred KB.
const MAX_FEED_SIZE: usize = 4 * 1024 * 1024;

/// Transport-level feed failure, distinct from the canonicalizer's
/// per-entry `ParseError`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("feed request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("feed at {url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("feed response exceeds the {limit}-byte limit")]
    TooLarge { limit: usize },
    #[error("feed document could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Supplies the raw IP/CIDR list for a named service and direction.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, service: &str, direction: &str) -> Result<Vec<String>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct FeedDocument {
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    cidr: String,
    #[serde(default)]
    product: Vec<String>,
    #[serde(default)]
    direction: Vec<String>,
}

/// Feed source backed by a single HTTP endpoint.
pub struct HttpFeed {
    client: Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("sgsync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self, service: &str, direction: &str) -> Result<Vec<String>, FetchError> {
        info!("Fetching {} {} ranges from {}", service, direction, self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: self.url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: response.status(),
            });
        }
        if let Some(length) = response.content_length() {
            if length as usize > MAX_FEED_SIZE {
                return Err(FetchError::TooLarge {
                    limit: MAX_FEED_SIZE,
                });
            }
        }

        let body = response
            .text()
            .await
            .map_err(|source| FetchError::Request {
                url: self.url.clone(),
                source,
            })?;
        if body.len() > MAX_FEED_SIZE {
            return Err(FetchError::TooLarge {
                limit: MAX_FEED_SIZE,
            });
        }

        let document: FeedDocument = serde_json::from_str(&body).map_err(FetchError::Decode)?;
        Ok(extract_entries(&document, service, direction))
    }
}

/// Filter the feed document down to raw IPv4 entries for one service and
/// direction. IPv6 entries are counted and skipped.
fn extract_entries(document: &FeedDocument, service: &str, direction: &str) -> Vec<String> {
    let mut skipped_v6 = 0usize;
    let entries: Vec<String> = document
        .items
        .iter()
        .filter(|item| {
            item.product.iter().any(|p| p == service)
                && item.direction.iter().any(|d| d == direction)
        })
        .filter_map(|item| {
            if item.cidr.contains(':') {
                skipped_v6 += 1;
                None
            } else if item.cidr.is_empty() {
                None
            } else {
                Some(item.cidr.clone())
            }
        })
        .collect();

    if skipped_v6 > 0 {
        warn!(
            "Skipped {} IPv6 entries from the feed (IPv6 is out of scope)",
            skipped_v6
        );
    }
    debug!(
        "Feed yielded {} {} {} entries",
        entries.len(),
        service,
        direction
    );
    entries
}
