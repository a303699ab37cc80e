//! Chat transport abstraction and supervision.
//!
//! The relay talks to the chat network only through the [`Transport`] trait:
//! the delivery worker calls [`Transport::send_bulk`], the supervisor calls
//! [`Transport::disconnect`] and [`Transport::start`].  Faults are reported
//! out of band on an unbounded error channel that [`supervise`] consumes.
//!
//! The concrete IRC implementation lives in [`irc`].

pub mod irc;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use self::irc::IrcTransport;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connecting, registering or joining failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// An established connection broke.
    #[error("connection lost: {0}")]
    Connection(String),
}

/// Sender half of the fault channel a transport reports on.
pub type ErrorSender = mpsc::UnboundedSender<TransportError>;
/// Receiver half consumed by [`supervise`].
pub type ErrorReceiver = mpsc::UnboundedReceiver<TransportError>;

/// A connection to the chat network.
///
/// Implementations handle their own handshakes (password, nick collisions,
/// keepalive, channel joins) inside [`start`](Transport::start).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect (or reconnect), authenticate and join channels.
    async fn start(&self) -> Result<(), TransportError>;

    /// Tear down the current connection, if any.
    async fn disconnect(&self);

    /// Send `message` to every channel in `channels`.  Fire-and-forget.
    async fn send_bulk(&self, channels: &[String], message: &str);
}

/// Watch `errors` and restart the transport after every reported fault.
///
/// Each fault triggers one disconnect, a `cooldown` pause and one start.
/// Faults queued while the old connection was being torn down belong to that
/// connection and are discarded.  There is no retry ceiling; the loop only
/// ends when `cancel` fires or every error sender has been dropped.
pub async fn supervise<T>(
    transport: Arc<T>,
    mut errors: ErrorReceiver,
    cooldown: Duration,
    cancel: CancellationToken,
) where
    T: Transport + ?Sized,
{
    loop {
        let fault = tokio::select! {
            _ = cancel.cancelled() => break,
            fault = errors.recv() => match fault {
                Some(fault) => fault,
                None => break,
            },
        };

        warn!(error = %fault, "transport error, disconnecting");
        transport.disconnect().await;
        while let Ok(stale) = errors.try_recv() {
            info!(error = %stale, "discarding fault from torn-down connection");
        }

        info!(cooldown_secs = cooldown.as_secs(), "restarting transport after cooldown");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(cooldown) => {}
        }

        if let Err(e) = transport.start().await {
            // The transport reports the same fault on its channel, which
            // schedules the next attempt.
            error!(error = %e, "transport restart failed");
        }
    }
}
