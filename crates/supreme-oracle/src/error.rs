//! Oracle error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] supreme_ledger::LedgerError),

    #[error("Core error: {0}")]
    Core(#[from] supreme_core::CoreError),

    /// The push ran past its timeout and was cancelled.
    #[error("Push abandoned after {elapsed_ms}ms")]
    StuckPush { elapsed_ms: u64 },
}

pub type OracleResult<T> = Result<T, OracleError>;
