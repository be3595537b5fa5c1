//! Ledger error types.

use thiserror::Error;

use crate::signer::{KeyError, SignerError};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// No key slot became free within the wait budget.
    #[error("All admin keys are busy (waited {waited_ms}ms)")]
    PoolExhausted { waited_ms: u64 },

    /// The ledger rejected the transaction or it failed during execution.
    #[error("Transaction failed: {0}")]
    SubmissionFailed(String),

    /// The transaction was accepted but did not seal in time.
    #[error("Transaction {tx_id} not sealed within {waited_ms}ms")]
    SealTimeout { tx_id: String, waited_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),

    #[error("Invalid account address: {0}")]
    InvalidAddress(String),

    #[error("Key {key_index} is not usable on account {address}")]
    KeyUnavailable { address: String, key_index: u32 },

    #[error("Signing error: {0}")]
    Signing(#[from] SignerError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Cadence error: {0}")]
    Cadence(#[from] supreme_core::CoreError),
}

impl LedgerError {
    /// Whether this is the expected "every key busy" condition.
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
