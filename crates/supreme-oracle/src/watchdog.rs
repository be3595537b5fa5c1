//! Oracle self-check.
//!
//! Every tick the watchdog checks for a silent feed (forces a reconnect) and
//! a stuck push (cancels it and frees the slot). Both checks are idempotent
//! and never fail.

use std::sync::Arc;
use std::time::Duration;

use supreme_core::Clock;
use supreme_feed::FeedConnection;
use supreme_telemetry::Metrics;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OracleConfig;
use crate::state::SharedOracleState;

/// Handle to whatever owns the feed connection.
pub trait FeedControl: Send + Sync {
    /// Close the live connection and reconnect. Returns `false` if there
    /// was nothing to close.
    fn force_reconnect(&self) -> bool;
}

impl FeedControl for FeedConnection {
    fn force_reconnect(&self) -> bool {
        FeedConnection::force_reconnect(self)
    }
}

/// What one watchdog pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogReport {
    pub feed_reconnected: bool,
    pub push_cleared: bool,
}

pub struct Watchdog {
    state: SharedOracleState,
    feed: Arc<dyn FeedControl>,
    clock: Arc<dyn Clock>,
    config: OracleConfig,
}

impl Watchdog {
    pub fn new(
        state: SharedOracleState,
        feed: Arc<dyn FeedControl>,
        clock: Arc<dyn Clock>,
        config: OracleConfig,
    ) -> Self {
        Self {
            state,
            feed,
            clock,
            config,
        }
    }

    /// Run both checks once.
    pub fn check(&self) -> WatchdogReport {
        let now_ms = self.clock.now_ms();
        let mut report = WatchdogReport::default();

        if let Some(silent_for_ms) = self.state.check_silent_feed(now_ms, self.config.silence_timeout_ms) {
            warn!(silent_for_ms, "No trades received, forcing feed reconnect");
            Metrics::watchdog_recovery("silent_feed");
            if !self.feed.force_reconnect() {
                debug!("Feed already reconnecting");
            }
            report.feed_reconnected = true;
        }

        if let Some(stuck_for_ms) = self.state.clear_stuck_push(now_ms, self.config.push_timeout_ms) {
            warn!(stuck_for_ms, "Oracle push stuck, cleared");
            Metrics::watchdog_recovery("stuck_push");
            report.push_cleared = true;
        }

        let last_push = self.state.snapshot().last_push_at_ms;
        if last_push > 0 {
            Metrics::oracle_last_push_age(now_ms.saturating_sub(last_push));
        }

        report
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.config.watchdog_interval_ms,
            silence_timeout_ms = self.config.silence_timeout_ms,
            push_timeout_ms = self.config.push_timeout_ms,
            "Oracle watchdog started"
        );

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.watchdog_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check();
                }
            }
        }
        info!("Oracle watchdog stopped");
    }
}
