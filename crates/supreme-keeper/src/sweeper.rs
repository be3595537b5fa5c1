//! Settlement sweep.
//!
//! Every poll, lists expired unsettled positions and settles a batch of at
//! most `max(1, pool/2)` of them concurrently. The other half of the key
//! pool stays free for oracle pushes and co-signed bets. A candidate that
//! fails is not retried here; it is still unsettled on-chain and comes back
//! in the next cycle's listing.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use supreme_core::cadence::decode_uint64_array;
use supreme_core::{CadenceValue, TransactionResult};
use supreme_ledger::{SubmitOptions, Submitter, TxKind};
use supreme_telemetry::Metrics;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SettlementConfig;
use crate::error::KeeperResult;
use crate::flight::FlightGuard;

pub const LIST_EXPIRED_POSITIONS_CDC: &str = include_str!("../cadence/list_expired_positions.cdc");
pub const SETTLE_POSITION_CDC: &str = include_str!("../cadence/settle_position.cdc");

/// Name of the event emitted by a settled position.
const POSITION_SETTLED: &str = "PositionSettled";

/// Parallel settlements allowed for a pool of `pool_size` keys.
pub fn batch_budget(pool_size: usize) -> usize {
    (pool_size / 2).max(1)
}

/// A position settled in this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SettledPosition {
    pub position_id: u64,
    pub tx_id: String,
    /// `None` when the transaction carried no `PositionSettled` event.
    pub won: Option<bool>,
    pub payout: Option<Decimal>,
}

/// Result of one sweep cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Previous cycle was still running; nothing was queried or submitted.
    pub skipped: bool,
    /// Expired positions returned by the listing.
    pub candidates: usize,
    /// Positions submitted this cycle.
    pub attempted: usize,
    pub settled: Vec<SettledPosition>,
    pub failed: Vec<u64>,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

pub struct SettlementSweeper {
    submitter: Arc<Submitter>,
    config: SettlementConfig,
    settling: AtomicBool,
}

impl SettlementSweeper {
    pub fn new(submitter: Arc<Submitter>, config: SettlementConfig) -> Self {
        Self {
            submitter,
            config,
            settling: AtomicBool::new(false),
        }
    }

    /// True while a cycle is running.
    pub fn is_settling(&self) -> bool {
        self.settling.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Run one sweep cycle.
    ///
    /// Returns an error only if the listing query fails; per-position
    /// failures are recorded in the report.
    pub async fn run_cycle(&self) -> KeeperResult<CycleReport> {
        let Some(_guard) = FlightGuard::try_enter(&self.settling) else {
            debug!("Previous settlement cycle still running, skipping");
            Metrics::settlement("skipped");
            return Ok(CycleReport::skipped());
        };

        let listing = self.submitter.query(LIST_EXPIRED_POSITIONS_CDC, Vec::new()).await?;
        let candidates = decode_uint64_array(&listing)?;
        Metrics::settlement_backlog(candidates.len());

        let mut report = CycleReport {
            candidates: candidates.len(),
            ..CycleReport::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let budget = batch_budget(self.submitter.pool_size());
        let batch: Vec<u64> = candidates.into_iter().take(budget).collect();
        report.attempted = batch.len();
        info!(
            candidates = report.candidates,
            batch = batch.len(),
            pool_size = self.submitter.pool_size(),
            "Settling expired positions"
        );

        let results = join_all(batch.iter().map(|&id| self.settle(id))).await;
        for (position_id, result) in batch.into_iter().zip(results) {
            match result {
                Ok(tx) => {
                    let settled = settled_position(position_id, &tx);
                    Metrics::settlement("settled");
                    info!(
                        position_id,
                        won = ?settled.won,
                        payout = ?settled.payout,
                        tx_id = %tx.short_id(),
                        "Position settled"
                    );
                    report.settled.push(settled);
                }
                Err(e) => {
                    Metrics::settlement("failed");
                    warn!(position_id, error = %e, "Failed to settle position");
                    report.failed.push(position_id);
                }
            }
        }

        Ok(report)
    }

    async fn settle(&self, position_id: u64) -> KeeperResult<TransactionResult> {
        let tx = self
            .submitter
            .submit(
                SETTLE_POSITION_CDC,
                vec![CadenceValue::uint64(position_id)],
                SubmitOptions::new(TxKind::Settlement).waiting(),
            )
            .await?;
        Ok(tx)
    }

    /// Poll until shutdown. Each cycle runs in its own task so a slow cycle
    /// makes the next poll skip instead of delaying it.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(poll_interval_ms = self.config.poll_interval_ms, "SettlementSweeper started");

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let sweeper = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = sweeper.run_cycle().await {
                            warn!(error = %e, "Settlement poll failed");
                        }
                    });
                }
            }
        }
        info!("SettlementSweeper stopped");
    }
}

fn settled_position(position_id: u64, tx: &TransactionResult) -> SettledPosition {
    let event = tx.find_event(POSITION_SETTLED);
    let won = event.and_then(|e| e.data.get("won")).and_then(|v| v.as_bool());
    let payout = event
        .and_then(|e| e.data.get("payout"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<Decimal>().ok());
    SettledPosition {
        position_id,
        tx_id: tx.id.clone(),
        won,
        payout,
    }
}
