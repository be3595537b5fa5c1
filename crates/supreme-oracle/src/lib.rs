//! Price oracle pipeline.
//!
//! Trade ticks are folded into a high/low/close window; every push interval
//! the window is submitted on-chain with at most one push in flight. A
//! watchdog recovers from a silent feed and from stuck pushes.

pub mod config;
pub mod error;
pub mod ingestor;
pub mod pusher;
pub mod state;
pub mod watchdog;

use std::sync::Arc;

use supreme_core::{Clock, Price};

pub use config::OracleConfig;
pub use error::{OracleError, OracleResult};
pub use ingestor::PriceIngestor;
pub use pusher::{OraclePusher, PushDecision, PUSH_PRICE_RANGE_CDC};
pub use state::{OracleHealth, OracleState, PushStart, SharedOracleState};
pub use watchdog::{FeedControl, Watchdog, WatchdogReport};

/// Read-only view of the oracle for API callers.
#[derive(Clone)]
pub struct OracleHandle {
    state: SharedOracleState,
    clock: Arc<dyn Clock>,
    stale_after_ms: u64,
}

impl OracleHandle {
    pub fn new(state: SharedOracleState, clock: Arc<dyn Clock>, stale_after_ms: u64) -> Self {
        Self {
            state,
            clock,
            stale_after_ms,
        }
    }

    /// Latest price, push age and staleness.
    pub fn health(&self) -> OracleHealth {
        self.state.health(self.clock.now_ms(), self.stale_after_ms)
    }

    pub fn latest_price(&self) -> Option<Price> {
        self.state.latest_price()
    }
}

impl std::fmt::Debug for OracleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleHandle")
            .field("stale_after_ms", &self.stale_after_ms)
            .finish()
    }
}
