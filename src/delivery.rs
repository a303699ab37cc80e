//! Outbound message delivery.
//!
//! The poll engine produces [`Outbound`] messages into a bounded FIFO
//! [`queue`]; a single worker ([`run_worker`]) drains it at a fixed pace so
//! the relay stays under the chat network's flood limits.  A full queue
//! blocks the producer instead of dropping messages.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::transport::Transport;

/// A rendered chat line waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Decoded item id, kept for logging.
    pub id: u64,
    pub text: String,
}

pub type OutboundSender = mpsc::Sender<Outbound>;
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

/// Create the bounded delivery queue.
pub fn queue(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity)
}

/// Renders items into single-line chat messages.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    permalink_base: String,
    print_endpoint: bool,
}

impl MessageTemplate {
    pub fn new(permalink_base: impl Into<String>, print_endpoint: bool) -> Self {
        Self {
            permalink_base: permalink_base.into(),
            print_endpoint,
        }
    }

    /// `[title] link`, or `[title] endpoint link` when endpoints are shown.
    pub fn render(&self, title: &str, suffix: &str, endpoint: &str) -> String {
        let title = single_line(title);
        let link = format!("{}{}", self.permalink_base, suffix);
        if self.print_endpoint {
            format!("[{title}] {endpoint} {link}")
        } else {
            format!("[{title}] {link}")
        }
    }
}

fn single_line(s: &str) -> String {
    s.split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drain `rx` forever, sending each message to `channels` and pausing
/// `delay` after every send.
///
/// Returns when `cancel` fires or every producer has been dropped.
pub async fn run_worker<T>(
    mut rx: OutboundReceiver,
    transport: Arc<T>,
    channels: Vec<String>,
    delay: Duration,
    cancel: CancellationToken,
) where
    T: Transport + ?Sized,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        debug!(id = msg.id, text = %msg.text, "delivering");
        transport.send_bulk(&channels, &msg.text).await;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!("delivery worker stopped");
}
