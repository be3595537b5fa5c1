//! Keeper loop configuration.

use rust_decimal::Decimal;
use serde::Deserialize;

fn default_settlement_poll_ms() -> u64 {
    10_000
}

fn default_house_check_ms() -> u64 {
    60_000
}

fn default_low_balance_threshold() -> Decimal {
    Decimal::from(10_000)
}

fn default_top_up_amount() -> Decimal {
    Decimal::from(100_000)
}

/// Settlement sweep configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_settlement_poll_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_settlement_poll_ms(),
        }
    }
}

/// House balance top-up configuration. Amounts are in PYUSD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HouseConfig {
    #[serde(default = "default_house_check_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_low_balance_threshold")]
    pub low_balance_threshold: Decimal,
    #[serde(default = "default_top_up_amount")]
    pub top_up_amount: Decimal,
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_house_check_ms(),
            low_balance_threshold: default_low_balance_threshold(),
            top_up_amount: default_top_up_amount(),
        }
    }
}
