//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key error: {0}")]
    Key(#[from] supreme_ledger::KeyError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] supreme_ledger::LedgerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] supreme_telemetry::TelemetryError),

    #[error("API error: {0}")]
    Api(#[from] supreme_api::ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
