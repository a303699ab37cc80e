//! Feed fetching abstraction.
//!
//! This module defines the [`Fetcher`] trait, the shared [`FeedItem`] type and
//! the [`FetchError`] taxonomy.  The concrete HTTP implementation lives in
//! [`http`].
//!
//! The poll engine is generic over [`Fetcher`], so tests substitute an
//! in-memory fake without touching the network.

mod feed_item;
mod http;

pub use feed_item::FeedItem;
pub use http::HttpFetcher;

use async_trait::async_trait;
use thiserror::Error;

/// Reasons a single endpoint fetch can fail.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("fetch response error: {0}")]
    Status(String),

    /// The body was neither a valid RSS nor a valid Atom document.
    #[error("could not parse feed: {0}")]
    Parse(String),
}

/// Something that can turn an endpoint name into an ordered list of items.
///
/// Implementations must preserve the feed's own item order; the poll engine
/// emits messages in that order.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, endpoint: &str) -> Result<Vec<FeedItem>, FetchError>;
}
