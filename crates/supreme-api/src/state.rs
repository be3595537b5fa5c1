//! Shared handler state.

use std::sync::Arc;

use dashmap::DashSet;
use supreme_core::Clock;
use supreme_keeper::BalanceGuard;
use supreme_ledger::Submitter;
use supreme_oracle::OracleHandle;

use crate::config::ApiConfig;

/// Everything the handlers read from. Cheap to clone.
#[derive(Clone)]
pub struct ApiState {
    pub(crate) submitter: Arc<Submitter>,
    pub(crate) oracle: OracleHandle,
    pub(crate) house: Arc<BalanceGuard>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Accounts funded (or being funded) by this process.
    pub(crate) funded: Arc<DashSet<String>>,
    pub(crate) config: ApiConfig,
}

impl ApiState {
    pub fn new(
        submitter: Arc<Submitter>,
        oracle: OracleHandle,
        house: Arc<BalanceGuard>,
        clock: Arc<dyn Clock>,
        config: ApiConfig,
    ) -> Self {
        Self {
            submitter,
            oracle,
            house,
            clock,
            funded: Arc::new(DashSet::new()),
            config,
        }
    }
}
