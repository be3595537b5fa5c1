//! Oracle push submission.
//!
//! At most one push is in flight. A push that finds the slot busy is
//! dropped (the next window supersedes it) unless the running push is past
//! its timeout, in which case the old push is cancelled and replaced.

use std::sync::Arc;

use rust_decimal::Decimal;
use supreme_core::{CadenceValue, Clock, PriceRange, TransactionResult};
use supreme_ledger::{Submitter, SubmitOptions, TxKind};
use supreme_telemetry::Metrics;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{OracleError, OracleResult};
use crate::state::{PushStart, PushTicket, SharedOracleState};

/// Updates both the point-price oracle and the range oracle in one
/// transaction.
pub const PUSH_PRICE_RANGE_CDC: &str = include_str!("../cadence/push_price_range.cdc");

/// What [`OraclePusher::push`] did with a window.
#[derive(Debug)]
pub enum PushDecision {
    /// A push task was spawned. `recovered` is set when a stuck push was
    /// cancelled to make room.
    Spawned {
        recovered: bool,
        handle: JoinHandle<()>,
    },
    /// A push is already in flight; this window was discarded.
    Dropped,
}

impl PushDecision {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped)
    }
}

/// Serializes price-range submissions.
pub struct OraclePusher {
    submitter: Arc<Submitter>,
    state: SharedOracleState,
    clock: Arc<dyn Clock>,
    push_timeout_ms: u64,
}

impl OraclePusher {
    pub fn new(
        submitter: Arc<Submitter>,
        state: SharedOracleState,
        clock: Arc<dyn Clock>,
        push_timeout_ms: u64,
    ) -> Self {
        Self {
            submitter,
            state,
            clock,
            push_timeout_ms,
        }
    }

    /// Start pushing `range` in the background.
    ///
    /// Never waits for the submission; the ingestor keeps consuming ticks.
    pub fn push(self: &Arc<Self>, range: PriceRange) -> PushDecision {
        let (ticket, recovered) = match self.state.try_begin_push(self.clock.now_ms(), self.push_timeout_ms) {
            PushStart::Started(ticket) => (ticket, false),
            PushStart::Recovered { ticket, stuck_for_ms } => {
                warn!(stuck_for_ms, "Previous oracle push stuck, abandoning it");
                Metrics::watchdog_recovery("stuck_push");
                (ticket, true)
            }
            PushStart::Dropped => {
                debug!("Oracle push already in flight, dropping window");
                Metrics::oracle_push("dropped");
                return PushDecision::Dropped;
            }
        };

        let pusher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            pusher.run_push(ticket, range).await;
        });
        PushDecision::Spawned { recovered, handle }
    }

    async fn run_push(&self, ticket: PushTicket, range: PriceRange) {
        let generation = ticket.generation;
        let result = tokio::select! {
            res = self.submit(range) => res,
            () = ticket.cancel.cancelled() => {
                let elapsed_ms = self
                    .clock
                    .now_ms()
                    .saturating_sub(self.state.snapshot().push_started_at_ms);
                Err(OracleError::StuckPush { elapsed_ms })
            }
        };

        let success = result.is_ok();
        let applied = self.state.finish_push(generation, success, self.clock.now_ms());

        match result {
            Ok(tx) => {
                Metrics::oracle_push("sealed");
                Metrics::oracle_last_push_age(0);
                info!(
                    close = %range.close,
                    high = %range.high,
                    low = %range.low,
                    tx_id = %tx.short_id(),
                    applied,
                    "Oracle price pushed"
                );
            }
            Err(OracleError::Ledger(e)) if e.is_pool_exhausted() => {
                Metrics::oracle_push("busy");
                debug!("All admin keys busy, skipping oracle push");
            }
            Err(OracleError::StuckPush { elapsed_ms }) => {
                Metrics::oracle_push("abandoned");
                warn!(elapsed_ms, generation, "Oracle push cancelled");
            }
            Err(e) => {
                Metrics::oracle_push("failed");
                warn!(error = %e, "Oracle push failed");
            }
        }
    }

    async fn submit(&self, range: PriceRange) -> OracleResult<TransactionResult> {
        let args = vec![
            CadenceValue::ufix64(range.close.inner())?,
            CadenceValue::ufix64(range.high.inner())?,
            CadenceValue::ufix64(range.low.inner())?,
            CadenceValue::ufix64(Decimal::from(range.timestamp_secs))?,
        ];
        let tx = self
            .submitter
            .submit(PUSH_PRICE_RANGE_CDC, args, SubmitOptions::new(TxKind::OraclePush))
            .await?;
        Ok(tx)
    }
}
