//! feedrelay: relays new feed items into IRC channels.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌─────────────┐  Outbound  ┌─────────────┐ send_bulk ┌──────────────┐
//! │ schedule.rs │ ─────────► │ delivery.rs │ ────────► │ transport/   │
//! │  + poll.rs  │  (bounded  │  (worker)   │           │  (irc)       │
//! └─────────────┘   queue)   └─────────────┘           └──────────────┘
//!        │                                                    ▲
//!        │ fetch()                                            │ disconnect/start
//!   ┌──────────┐                                     ┌──────────────────┐
//!   │ source/  │                                     │ supervise (task) │
//!   └──────────┘                                     └──────────────────┘
//! ```
//!
//! * **`source/`**: the `Fetcher` trait and the HTTP RSS/Atom fetcher.
//! * **`ident`**: turns `t3_xxxx` identifiers into comparable numbers.
//! * **`poll`**: bootstrap and steady-state cycles, owns the watermark.
//! * **`schedule`**: bootstrap retries and wall-clock aligned cycles.
//! * **`delivery`**: message template, bounded queue, paced worker.
//! * **`transport/`**: the chat connection and its reconnect supervisor.
//! * **`main`**: wires everything together and handles Ctrl-C.

mod config;
mod delivery;
mod ident;
mod poll;
mod schedule;
mod source;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, Overrides};
use delivery::MessageTemplate;
use poll::PollEngine;
use source::HttpFetcher;
use transport::{IrcTransport, Transport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay new feed items into IRC channels")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "feedrelay.yaml")]
    config: PathBuf,
    /// Default log filter when RUST_LOG is unset (e.g. "debug", "feedrelay=trace")
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&args.log_level).context("Invalid --log-level")?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&args.config, &args.overrides)?;
    let timing = config.timing.clone();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "could not listen for ctrl-c");
                return;
            }
            info!("shutdown requested");
            cancel.cancel();
        });
    }

    // -- transport + supervisor ----------------------------------------------
    let (err_tx, err_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(IrcTransport::new(&config.irc, timing.connect_timeout(), err_tx));
    let supervisor = tokio::spawn(transport::supervise(
        transport.clone(),
        err_rx,
        timing.reconnect_cooldown(),
        cancel.clone(),
    ));
    if let Err(e) = transport.start().await {
        warn!(error = %e, "initial irc connection failed, supervisor will retry");
    }

    // -- bootstrap -----------------------------------------------------------
    let fetcher = HttpFetcher::new(
        config.feeds.base_url.clone(),
        &config.feeds.user_agent,
        timing.fetch_timeout(),
    )
    .context("Failed to build HTTP client")?;
    let template = MessageTemplate::new(
        config.feeds.permalink_base.clone(),
        config.feeds.print_endpoint,
    );
    let mut engine = PollEngine::new(fetcher, config.feeds.endpoints.clone(), template);

    if schedule::bootstrap_until_ready(&mut engine, timing.bootstrap_backoff(), &cancel).await {
        // -- delivery + schedule ---------------------------------------------
        let (tx, rx) = delivery::queue(timing.queue_capacity);
        let worker = tokio::spawn(delivery::run_worker(
            rx,
            transport.clone(),
            config.irc.channels.clone(),
            timing.send_delay(),
            cancel.clone(),
        ));

        schedule::run_cycles(&mut engine, &tx, timing.interval(), timing.round(), &cancel).await;
        drop(tx);
        let _ = worker.await;
    }

    cancel.cancel();
    let _ = supervisor.await;
    transport.disconnect().await;
    info!("stopped");
    Ok(())
}
