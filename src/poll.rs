//! Poll cycle engine.
//!
//! A [`PollEngine`] owns the watermark, the highest item id already relayed.
//! It runs two kinds of cycle over every configured endpoint:
//!
//! * [`bootstrap`](PollEngine::bootstrap) records the newest id currently
//!   visible without emitting anything, so a fresh start does not flood the
//!   channels with backlog.
//! * [`poll`](PollEngine::poll) emits one [`Outbound`] per item newer than the
//!   watermark captured at the start of the cycle, de-duplicating items that
//!   show up on several endpoints.
//!
//! Both cycles are all-or-nothing: a single failed fetch leaves the watermark
//! untouched and nothing is queued.
//!
//! ## Watermark
//!
//! The watermark never moves backwards.  A listing whose freshest items have
//! temporarily dropped out would otherwise lower it and cause old items to be
//! relayed again on a later cycle.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::delivery::{MessageTemplate, Outbound, OutboundSender};
use crate::ident;
use crate::source::{FeedItem, FetchError, Fetcher};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("could not fetch {endpoint}: {source}")]
    Fetch {
        endpoint: String,
        #[source]
        source: FetchError,
    },

    #[error("delivery queue is closed")]
    QueueClosed,
}

/// Counters describing one completed cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Items carrying a decodable id.
    pub seen: usize,
    /// Items already seen on an earlier endpoint this cycle.
    pub duplicates: usize,
    /// Items with the id prefix but an undecodable suffix.
    pub malformed: usize,
    /// Messages handed to the delivery queue.
    pub emitted: usize,
    /// Watermark after the cycle.
    pub watermark: u64,
}

/// An item that survived decoding.
struct Decoded<'a> {
    id: u64,
    suffix: &'a str,
    item: &'a FeedItem,
}

pub struct PollEngine<F> {
    fetcher: F,
    endpoints: Vec<String>,
    template: MessageTemplate,
    watermark: u64,
}

impl<F: Fetcher> PollEngine<F> {
    pub fn new(fetcher: F, endpoints: Vec<String>, template: MessageTemplate) -> Self {
        Self {
            fetcher,
            endpoints,
            template,
            watermark: 0,
        }
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    #[cfg(test)]
    pub fn set_watermark(&mut self, watermark: u64) {
        self.watermark = watermark;
    }

    /// Record the newest visible id without emitting anything.
    ///
    /// On failure the watermark is left unmodified and the caller is expected
    /// to retry the whole bootstrap.
    pub async fn bootstrap(&mut self) -> Result<u64, CycleError> {
        let mut largest = self.watermark;
        for endpoint in &self.endpoints {
            let items = self.fetch(endpoint).await?;
            let mut malformed = 0;
            for decoded in decode_all(&items, &mut malformed) {
                largest = largest.max(decoded.id);
            }
            debug!(%endpoint, items = items.len(), malformed, "bootstrap endpoint fetched");
        }

        self.watermark = largest;
        info!(watermark = largest, "bootstrap complete");
        Ok(largest)
    }

    /// Run one steady-state cycle, queueing every new item on `queue`.
    ///
    /// Messages are only queued once every endpoint has been fetched, in
    /// endpoint order and feed order.  Sending waits for queue capacity.
    pub async fn poll(&mut self, queue: &OutboundSender) -> Result<CycleReport, CycleError> {
        let previous = self.watermark;
        let mut report = CycleReport::default();
        let mut seen_ids = HashSet::new();
        let mut largest = 0u64;
        let mut pending = Vec::new();

        for endpoint in &self.endpoints {
            let items = self.fetch(endpoint).await?;

            for decoded in decode_all(&items, &mut report.malformed) {
                if !seen_ids.insert(decoded.id) {
                    report.duplicates += 1;
                    continue;
                }
                report.seen += 1;
                largest = largest.max(decoded.id);

                if decoded.id > previous {
                    debug!(id = decoded.id, %endpoint, link = ?decoded.item.link, "new item");
                    let text = self
                        .template
                        .render(&decoded.item.title, decoded.suffix, endpoint);
                    pending.push(Outbound {
                        id: decoded.id,
                        text,
                    });
                }
            }
        }

        report.emitted = pending.len();
        for msg in pending {
            queue.send(msg).await.map_err(|_| CycleError::QueueClosed)?;
        }

        self.watermark = previous.max(largest);
        report.watermark = self.watermark;
        Ok(report)
    }

    async fn fetch(&self, endpoint: &str) -> Result<Vec<FeedItem>, CycleError> {
        self.fetcher
            .fetch(endpoint)
            .await
            .map_err(|source| CycleError::Fetch {
                endpoint: endpoint.to_string(),
                source,
            })
    }
}

/// Decode every relayable item, skipping unprefixed ones silently and
/// malformed ones with a warning.
fn decode_all<'a>(items: &'a [FeedItem], malformed: &mut usize) -> Vec<Decoded<'a>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(suffix) = item.suffix() else {
            continue;
        };
        match ident::decode(suffix) {
            Ok(id) => out.push(Decoded { id, suffix, item }),
            Err(e) => {
                *malformed += 1;
                warn!(raw_id = %item.raw_id, error = %e, "skipping item with malformed id");
            }
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Serves canned items per endpoint; endpoints listed in `failing` error.
    #[derive(Default)]
    pub struct FakeFetcher {
        pub feeds: Mutex<HashMap<String, Vec<FeedItem>>>,
        pub failing: Mutex<HashSet<String>>,
        pub calls: AtomicUsize,
    }

    impl FakeFetcher {
        pub fn set(&self, endpoint: &str, ids: &[&str]) {
            let items = ids
                .iter()
                .map(|raw| FeedItem::new(format!("title {raw}"), *raw))
                .collect();
            self.feeds.lock().unwrap().insert(endpoint.to_string(), items);
        }

        pub fn fail(&self, endpoint: &str, failing: bool) {
            let mut set = self.failing.lock().unwrap();
            if failing {
                set.insert(endpoint.to_string());
            } else {
                set.remove(endpoint);
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, endpoint: &str) -> Result<Vec<FeedItem>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.lock().unwrap().contains(endpoint) {
                return Err(FetchError::Status("503 Service Unavailable".into()));
            }
            Ok(self
                .feeds
                .lock()
                .unwrap()
                .get(endpoint)
                .cloned()
                .unwrap_or_default())
        }
    }

    #[async_trait]
    impl<T: Fetcher> Fetcher for std::sync::Arc<T> {
        async fn fetch(&self, endpoint: &str) -> Result<Vec<FeedItem>, FetchError> {
            (**self).fetch(endpoint).await
        }
    }
}
