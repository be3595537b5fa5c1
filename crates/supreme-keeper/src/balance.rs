//! House balance guard.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use supreme_core::cadence::decode_ufix64;
use supreme_core::CadenceValue;
use supreme_ledger::{SubmitOptions, Submitter, TxKind};
use supreme_telemetry::Metrics;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HouseConfig;
use crate::error::KeeperResult;
use crate::flight::FlightGuard;

pub const GET_HOUSE_BALANCE_CDC: &str = include_str!("../cadence/get_house_balance.cdc");
pub const MINT_AND_FUND_HOUSE_CDC: &str = include_str!("../cadence/mint_and_fund_house.cdc");

/// What one balance check did.
#[derive(Debug, Clone, PartialEq)]
pub enum TopUpOutcome {
    /// A previous check is still running.
    Skipped,
    /// Balance at or above the threshold.
    Healthy { balance: Decimal },
    ToppedUp {
        balance: Decimal,
        amount: Decimal,
        tx_id: String,
    },
}

/// Keeps the house pool funded.
pub struct BalanceGuard {
    submitter: Arc<Submitter>,
    config: HouseConfig,
    funding: AtomicBool,
}

impl BalanceGuard {
    pub fn new(submitter: Arc<Submitter>, config: HouseConfig) -> Self {
        Self {
            submitter,
            config,
            funding: AtomicBool::new(false),
        }
    }

    pub fn is_funding(&self) -> bool {
        self.funding.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Current house balance (query path, no key used).
    pub async fn house_balance(&self) -> KeeperResult<Decimal> {
        let value = self.submitter.query(GET_HOUSE_BALANCE_CDC, Vec::new()).await?;
        Ok(decode_ufix64(&value)?)
    }

    /// Check the balance and top it up if it is below the threshold.
    pub async fn check(&self) -> KeeperResult<TopUpOutcome> {
        let Some(_guard) = FlightGuard::try_enter(&self.funding) else {
            debug!("House funding already in progress");
            Metrics::house_topup("skipped");
            return Ok(TopUpOutcome::Skipped);
        };

        let balance = self.house_balance().await?;
        if balance >= self.config.low_balance_threshold {
            debug!(%balance, "House balance healthy");
            return Ok(TopUpOutcome::Healthy { balance });
        }

        let amount = self.config.top_up_amount;
        info!(
            %balance,
            threshold = %self.config.low_balance_threshold,
            %amount,
            "House balance low, minting top-up"
        );

        let result = self
            .submitter
            .submit(
                MINT_AND_FUND_HOUSE_CDC,
                vec![CadenceValue::ufix64(amount)?],
                SubmitOptions::new(TxKind::HouseTopUp).waiting(),
            )
            .await;

        match result {
            Ok(tx) => {
                Metrics::house_topup("funded");
                info!(%amount, tx_id = %tx.short_id(), "House funded");
                Ok(TopUpOutcome::ToppedUp {
                    balance,
                    amount,
                    tx_id: tx.id,
                })
            }
            Err(e) => {
                Metrics::house_topup("failed");
                Err(e.into())
            }
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_ms = self.config.check_interval_ms,
            threshold = %self.config.low_balance_threshold,
            "BalanceGuard started"
        );

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.check_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let guard = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = guard.check().await {
                            warn!(error = %e, "House balance check failed");
                        }
                    });
                }
            }
        }
        info!("BalanceGuard stopped");
    }
}
