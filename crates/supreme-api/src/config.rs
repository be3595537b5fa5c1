//! HTTP API configuration.

use rust_decimal::Decimal;
use serde::Deserialize;

fn default_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    3001
}

fn default_fund_amount() -> Decimal {
    Decimal::from(100)
}

fn default_fund_skip_balance() -> Decimal {
    Decimal::from(10)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    /// FLOW sent to a new user account.
    #[serde(default = "default_fund_amount")]
    pub fund_amount: Decimal,
    /// Accounts holding at least this much FLOW are not funded.
    #[serde(default = "default_fund_skip_balance")]
    pub fund_skip_balance: Decimal,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            port: default_port(),
            fund_amount: default_fund_amount(),
            fund_skip_balance: default_fund_skip_balance(),
        }
    }
}
