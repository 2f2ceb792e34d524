//! Reconnection supervisor
//!
//! Waits for failure reports from the reader or executor, tears the dead
//! session down and dials again with exponential backoff until a new session
//! is authenticated and its subscriptions are restored.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    connection::{
        open_session, replay_subscriptions, shutdown_signalled, DisconnectReason, SharedState,
    },
    error::EslResult,
};

/// Failure report for one connection generation.
#[derive(Debug)]
pub(crate) struct TransportFailure {
    pub(crate) generation: u64,
    pub(crate) reason: DisconnectReason,
}

/// Delay between reconnect attempts: doubles from `floor` up to `ceiling`,
/// back to `floor` after a successful reconnect.
#[derive(Debug, Clone)]
pub(crate) struct ReconnectBackoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
    attempts: u32,
}

impl ReconnectBackoff {
    pub(crate) fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
            attempts: 0,
        }
    }

    /// Delay to wait now; the next one is doubled.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .saturating_mul(2)
            .min(self.ceiling);
        self.attempts += 1;
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.floor;
        self.attempts = 0;
    }

    #[cfg(test)]
    fn current(&self) -> Duration {
        self.current
    }

    /// Failed attempts since the last success.
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Supervisor task; runs until the client shuts down.
pub(crate) async fn supervise(
    shared: Arc<SharedState>,
    mut failures: mpsc::UnboundedReceiver<TransportFailure>,
) {
    let mut shutdown = shared.shutdown_receiver();
    loop {
        let failure = tokio::select! {
            f = failures.recv() => match f {
                Some(f) => f,
                None => return,
            },
            _ = shutdown_signalled(&mut shutdown) => {
                debug!("[RECONNECT] Shutdown requested, supervisor exiting");
                return;
            }
        };

        if failure.generation != shared.generation() {
            debug!(
                generation = failure.generation,
                "[RECONNECT] Ignoring failure of replaced connection"
            );
            continue;
        }

        info!(
            generation = failure.generation,
            "[RECONNECT] Session lost ({}), reconnecting", failure.reason
        );
        tokio::select! {
            _ = restore(&shared) => {}
            _ = shutdown_signalled(&mut shutdown) => {
                debug!("[RECONNECT] Shutdown requested during reconnect");
                return;
            }
        }
    }
}

/// Tear down the dead session, then retry until a new one is installed.
async fn restore(shared: &Arc<SharedState>) {
    {
        let mut state = shared
            .conn_state
            .lock()
            .await;
        shared
            .teardown(&mut state)
            .await;
    }

    loop {
        if shared.is_closing() {
            return;
        }
        shared.mark_reconnecting();

        shared
            .reconnect_attempts
            .fetch_add(1, Ordering::Relaxed);
        let delay = match attempt(shared).await {
            Ok(subscriptions) => {
                info!("[RECONNECT] Reconnected, {} subscription(s) restored", subscriptions);
                return;
            }
            Err(e) => {
                let mut state = shared
                    .conn_state
                    .lock()
                    .await;
                let delay = state
                    .backoff
                    .next_delay();
                warn!(
                    "[RECONNECT] Attempt {} failed: {}; retrying in {}ms",
                    state
                        .backoff
                        .attempts(),
                    e,
                    delay.as_millis()
                );
                delay
            }
        };
        tokio::time::sleep(delay).await;
    }
}

/// Dial, authenticate and replay subscriptions; install only if all three succeed.
///
/// `conn_state` is taken only after the handshake, so subscription calls made
/// meanwhile fail fast instead of queueing behind a slow dial.
async fn attempt(shared: &Arc<SharedState>) -> EslResult<usize> {
    let config = &shared.config;
    let (mut stream, mut parser) = open_session(config).await?;

    let mut state = shared
        .conn_state
        .lock()
        .await;
    replay_subscriptions(
        &mut stream,
        &mut parser,
        config.event_format,
        &state.subscriptions,
        shared.command_timeout_ms(),
        &shared.dispatcher,
    )
    .await?;
    shared
        .install(&mut state, stream, parser)
        .await;
    Ok(state
        .subscriptions
        .len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(500), Duration::from_secs(4));
        let delays: Vec<u128> = (0..6)
            .map(|_| {
                backoff
                    .next_delay()
                    .as_millis()
            })
            .collect();
        assert_eq!(delays, [500, 1000, 2000, 4000, 4000, 4000]);
        assert_eq!(backoff.attempts(), 6);
    }

    #[test]
    fn test_backoff_is_non_decreasing() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(300), Duration::from_millis(7000));
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= last);
            assert!(delay <= Duration::from_millis(7000));
            last = delay;
        }
    }

    #[test]
    fn test_backoff_resets_to_floor() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_millis(400));
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(100));
        assert_eq!(backoff.attempts(), 0);
    }

    #[test]
    fn test_ceiling_below_floor_clamped() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
