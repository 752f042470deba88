//! Fixed-interval polling used by the interactive views.
//!
//! Every loop fetches once immediately, then once per period until its
//! [`CancellationToken`] fires. Failures are logged and the next tick runs as
//! usual; there is no backoff and no jitter.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub content: Duration,
    pub chat: Duration,
    pub points: Duration,
    pub leaderboard: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            content: Duration::from_secs(2),
            chat: Duration::from_secs(3),
            points: Duration::from_secs(5),
            leaderboard: Duration::from_secs(10),
        }
    }
}

/// Runs `fetch` every `period` and hands successful results to `sink`.
///
/// When `nudge` is notified the loop fetches right away without waiting for
/// the next tick (used to refresh points after a local reward).
pub async fn poll_loop<F, Fut, T, E, S>(
    label: &'static str,
    period: Duration,
    cancel: CancellationToken,
    nudge: Option<Arc<Notify>>,
    mut fetch: F,
    mut sink: S,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    S: FnMut(T),
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = wait_nudge(nudge.as_deref()) => {
                debug!(label, "poll: refresh requested");
            }
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            r = fetch() => r,
        };
        match result {
            Ok(v) => sink(v),
            Err(e) => warn!(label, error = %e, "poll failed; retrying next tick"),
        }
    }
    debug!(label, "poll: stopped");
}

async fn wait_nudge(nudge: Option<&Notify>) {
    match nudge {
        Some(n) => n.notified().await,
        None => std::future::pending().await,
    }
}
