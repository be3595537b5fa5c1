//! Periodic ledger upkeep.
//!
//! - `SettlementSweeper`: settles expired positions in pool-bounded batches
//! - `BalanceGuard`: tops up the house pool when it runs low
//!
//! Both loops are single-flight: a tick that finds the previous cycle still
//! running is skipped, never queued.

pub mod balance;
pub mod config;
pub mod error;
pub mod flight;
pub mod sweeper;

pub use balance::{BalanceGuard, TopUpOutcome, GET_HOUSE_BALANCE_CDC, MINT_AND_FUND_HOUSE_CDC};
pub use config::{HouseConfig, SettlementConfig};
pub use error::{KeeperError, KeeperResult};
pub use flight::FlightGuard;
pub use sweeper::{
    batch_budget, CycleReport, SettledPosition, SettlementSweeper, LIST_EXPIRED_POSITIONS_CDC,
    SETTLE_POSITION_CDC,
};
