//! Core domain types for the supreme ledger keeper.
//!
//! This crate provides the types shared by every other crate:
//! - `Price`: precision-safe price wrapper with UFix64 formatting
//! - `TradeTick`, `PriceRange`: feed samples and the aggregated push window
//! - `CadenceValue`: typed transaction/script arguments (JSON-Cadence)
//! - `TransactionResult`, `LedgerEvent`: sealed transaction outcome
//! - `Clock`: injectable time source

pub mod cadence;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod types;

pub use cadence::CadenceValue;
pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{Price, UFIX64_SCALE};
pub use error::{CoreError, Result};
pub use types::{LedgerEvent, PriceRange, TradeTick, TransactionResult};
