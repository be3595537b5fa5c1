//! Keeper error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] supreme_ledger::LedgerError),

    #[error("Unexpected script result: {0}")]
    Decode(#[from] supreme_core::CoreError),
}

pub type KeeperResult<T> = Result<T, KeeperError>;
