//! Cycle scheduling.
//!
//! [`bootstrap_until_ready`] repeats the bootstrap cycle until it succeeds.
//! [`run_cycles`] then waits for the next wall-clock boundary (e.g. the next
//! five minute mark), runs a steady-state cycle straight away and repeats it
//! on a fixed period.  Ticks missed while a cycle overran are skipped rather
//! than replayed.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::delivery::OutboundSender;
use crate::poll::{CycleError, PollEngine};
use crate::source::Fetcher;

/// Earliest multiple of `round` (counted from the Unix epoch) at or after
/// `now`.
pub fn first_tick(now: DateTime<Utc>, round: Duration) -> DateTime<Utc> {
    let step = match i64::try_from(round.as_millis()) {
        Ok(step) if step > 0 => step,
        _ => return now,
    };
    let millis = now.timestamp_millis();
    let floor = millis - millis.rem_euclid(step);
    let floor = DateTime::<Utc>::from_timestamp_millis(floor).unwrap_or(now);
    if floor < now {
        floor + TimeDelta::milliseconds(step)
    } else {
        floor
    }
}

/// Run the bootstrap cycle until it succeeds, sleeping `backoff` between
/// attempts.  Returns `false` if cancelled first.
pub async fn bootstrap_until_ready<F: Fetcher>(
    engine: &mut PollEngine<F>,
    backoff: Duration,
    cancel: &CancellationToken,
) -> bool {
    loop {
        match engine.bootstrap().await {
            Ok(watermark) => {
                info!(watermark, "first run succeeded");
                return true;
            }
            Err(e) => {
                warn!(error = %e, retry_in_secs = backoff.as_secs(), "first run failed");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(backoff) => info!("retrying first run"),
        }
    }
}

/// Align to the next `round` boundary, then poll every `interval` until
/// cancelled or the delivery queue closes.
pub async fn run_cycles<F: Fetcher>(
    engine: &mut PollEngine<F>,
    queue: &OutboundSender,
    interval: Duration,
    round: Duration,
    cancel: &CancellationToken,
) {
    let now = Utc::now();
    let start = first_tick(now, round);
    let wait = (start - now).to_std().unwrap_or_default();
    info!(first_cycle = %start, "waiting for first cycle");

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(wait) => {}
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match engine.poll(queue).await {
            Ok(report) => info!(
                seen = report.seen,
                duplicates = report.duplicates,
                malformed = report.malformed,
                emitted = report.emitted,
                watermark = report.watermark,
                "cycle complete"
            ),
            Err(CycleError::QueueClosed) => {
                warn!("delivery queue closed");
                break;
            }
            Err(e) => warn!(error = %e, "could not fetch posts, skipping cycle"),
        }
    }
    info!(watermark = engine.watermark(), "scheduler stopped");
}
