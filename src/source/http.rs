//! HTTP feed fetcher.
//!
//! Retrieves `<base_url><endpoint>.rss` with the configured `User-Agent` and
//! parses the body.  Every request is bounded by a timeout so an unresponsive
//! server fails the cycle instead of stalling it.  Reddit style `.rss` URLs actually serve Atom, so the
//! body is tried as RSS 2.0 first and as Atom second.
//!
//! Parsing is split into pure functions ([`HttpFetcher::parse_channel`],
//! [`HttpFetcher::parse_atom`]) so tests can exercise it without the network.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{FeedItem, FetchError, Fetcher};

const FEED_SUFFIX: &str = ".rss";

pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    /// Create a fetcher that resolves endpoints against `base_url`, sends
    /// `user_agent` with every request and gives up after `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Full feed URL for `endpoint`.
    pub fn feed_url(&self, endpoint: &str) -> String {
        let mut url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);
        if !endpoint.contains(FEED_SUFFIX) {
            url.push_str(FEED_SUFFIX);
        }
        url
    }

    /// Parse a body as RSS, falling back to Atom.
    pub fn parse_body(body: &[u8]) -> Result<Vec<FeedItem>, FetchError> {
        match rss::Channel::read_from(body) {
            Ok(channel) => Ok(Self::parse_channel(&channel)),
            Err(rss_err) => match atom_syndication::Feed::read_from(body) {
                Ok(feed) => Ok(Self::parse_atom(&feed)),
                Err(atom_err) => Err(FetchError::Parse(format!(
                    "not rss ({rss_err}) and not atom ({atom_err})"
                ))),
            },
        }
    }

    /// Convert an RSS channel into items, preserving document order.
    pub fn parse_channel(channel: &rss::Channel) -> Vec<FeedItem> {
        channel
            .items()
            .iter()
            .map(|item| {
                // Prefer <guid>, fall back to <link>, then empty string.
                let raw_id = item
                    .guid()
                    .map(|g| g.value().to_string())
                    .or_else(|| item.link().map(String::from))
                    .unwrap_or_default();

                FeedItem {
                    title: item.title().unwrap_or("(untitled)").to_string(),
                    raw_id,
                    link: item.link().map(String::from),
                }
            })
            .collect()
    }

    /// Convert an Atom feed into items, preserving document order.
    pub fn parse_atom(feed: &atom_syndication::Feed) -> Vec<FeedItem> {
        feed.entries()
            .iter()
            .map(|entry| {
                let title = entry.title().value.as_str();
                FeedItem {
                    title: if title.is_empty() { "(untitled)" } else { title }.to_string(),
                    raw_id: entry.id().to_string(),
                    link: entry.links().first().map(|l| l.href().to_string()),
                }
            })
            .collect()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, endpoint: &str) -> Result<Vec<FeedItem>, FetchError> {
        let url = self.feed_url(endpoint);
        debug!(%url, "fetching feed");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.to_string()));
        }

        let body = resp.bytes().await?;
        Self::parse_body(body.as_ref())
    }
}
