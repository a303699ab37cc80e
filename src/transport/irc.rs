//! IRC implementation of [`Transport`] on top of the `irc` crate.
//!
//! The library already answers PINGs, falls back to alternate nicks when the
//! preferred one is taken, sends the server password and joins the configured
//! channels once registration completes.  This module only owns the
//! connection lifecycle and turns stream failures into [`TransportError`]s.
//!
//! Connecting happens outside the session lock and is bounded by a timeout,
//! so a stalled handshake never blocks [`Transport::send_bulk`]; sends made
//! meanwhile are dropped as if disconnected.

use std::time::Duration;

use ::irc::client::prelude::{Client, Config, Sender};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{ErrorSender, Transport, TransportError};
use crate::config::IrcConfig;

const QUIT_MESSAGE: &str = "feedrelay";
const QUIT_GRACE: Duration = Duration::from_secs(2);
const ALT_NICKS: usize = 3;

struct Session {
    sender: Sender,
    reader: JoinHandle<()>,
    closing: CancellationToken,
}

pub struct IrcTransport {
    config: Config,
    connect_timeout: Duration,
    errors: ErrorSender,
    session: Mutex<Option<Session>>,
}

impl IrcTransport {
    pub fn new(settings: &IrcConfig, connect_timeout: Duration, errors: ErrorSender) -> Self {
        let (host, port) = split_server(&settings.server, settings.tls);
        let config = Config {
            nickname: Some(settings.nick.clone()),
            alt_nicks: alt_nicks(&settings.nick),
            username: Some(settings.user().to_string()),
            realname: Some(settings.user().to_string()),
            password: settings.password.clone(),
            server: Some(host),
            port: Some(port),
            use_tls: Some(settings.tls),
            channels: settings.channels.clone(),
            ..Config::default()
        };

        Self {
            config,
            connect_timeout,
            errors,
            session: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Session, TransportError> {
        let connect_err = |e: ::irc::error::Error| TransportError::Connect(e.to_string());

        let mut client = Client::from_config(self.config.clone())
            .await
            .map_err(connect_err)?;
        client.identify().map_err(connect_err)?;
        let mut stream = client.stream().map_err(connect_err)?;
        let sender = client.sender();

        let closing = CancellationToken::new();
        let reader_closing = closing.clone();
        let errors = self.errors.clone();

        let reader = tokio::spawn(async move {
            // The stream also flushes outgoing messages, so the client has to
            // live as long as it is polled.
            let _client = client;
            let fault = loop {
                match stream.next().await {
                    Some(Ok(message)) => trace!(?message, "irc recv"),
                    Some(Err(e)) => break e.to_string(),
                    None => break "server closed the connection".to_string(),
                }
            };
            if !reader_closing.is_cancelled() {
                let _ = errors.send(TransportError::Connection(fault));
            }
        });

        Ok(Session {
            sender,
            reader,
            closing,
        })
    }

    async fn close(mut session: Session) {
        session.closing.cancel();
        if let Err(e) = session.sender.send_quit(QUIT_MESSAGE) {
            debug!(error = %e, "could not queue QUIT");
        }
        if tokio::time::timeout(QUIT_GRACE, &mut session.reader)
            .await
            .is_err()
        {
            session.reader.abort();
        }
    }
}

#[async_trait]
impl Transport for IrcTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let previous = self.session.lock().await.take();
        if let Some(old) = previous {
            Self::close(old).await;
        }

        info!(
            server = ?self.config.server,
            port = ?self.config.port,
            nick = ?self.config.nickname,
            "connecting to irc"
        );
        let connected = match tokio::time::timeout(self.connect_timeout, self.connect()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Connect(format!(
                "timed out after {}s",
                self.connect_timeout.as_secs_f32()
            ))),
        };

        match connected {
            Ok(session) => {
                // A concurrent start may have installed its own session.
                let replaced = self.session.lock().await.replace(session);
                if let Some(stale) = replaced {
                    Self::close(stale).await;
                }
                Ok(())
            }
            Err(e) => {
                let _ = self.errors.send(e.clone());
                Err(e)
            }
        }
    }

    async fn disconnect(&self) {
        let current = self.session.lock().await.take();
        if let Some(session) = current {
            info!("disconnecting from irc");
            Self::close(session).await;
        }
    }

    async fn send_bulk(&self, channels: &[String], message: &str) {
        let guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            warn!(%message, "not connected, dropping message");
            return;
        };

        for channel in channels {
            if let Err(e) = session.sender.send_privmsg(channel, message) {
                warn!(%channel, error = %e, "could not send message");
            }
        }
    }
}

/// Split `host[:port]`, defaulting the port from the TLS setting.
fn split_server(server: &str, tls: bool) -> (String, u16) {
    let default_port = if tls { 6697 } else { 6667 };
    match server.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (server.to_string(), default_port),
        },
        _ => (server.to_string(), default_port),
    }
}

fn alt_nicks(nick: &str) -> Vec<String> {
    (1..=ALT_NICKS).map(|n| format!("{nick}{}", "_".repeat(n))).collect()
}
