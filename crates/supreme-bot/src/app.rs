//! Application orchestration.
//!
//! ```text
//!   trade feed ──ticks──▶ PriceIngestor ──window──▶ OraclePusher ─┐
//!        ▲                     │                                  │
//!        └── force reconnect ─ Watchdog ◀── OracleState ──────────┤
//!                                                                 ▼
//!   SettlementSweeper ──────────────────────────────────────▶ Submitter ──▶ ledger
//!   BalanceGuard ───────────────────────────────────────────▶  (KeyPool)
//!   HTTP API ───────────────────────────────────────────────▶
//! ```

use std::sync::Arc;
use std::time::Duration;

use supreme_api::{run_server, ApiState};
use supreme_core::{Clock, SystemClock};
use supreme_feed::{spawn_feed, FeedConnection};
use supreme_keeper::{BalanceGuard, SettlementSweeper};
use supreme_ledger::{DynLedgerClient, KeyPool, KeyRing, RestLedgerClient, Submitter};
use supreme_oracle::{OracleHandle, OraclePusher, PriceIngestor, SharedOracleState, Watchdog};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;

/// Buffered ticks between the feed and the ingestor.
const TICK_CHANNEL_CAPACITY: usize = 1024;

/// How long tasks get to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Route panic messages through tracing. A panicking task does not stop the
/// process.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        error!(panic = %info, "Task panicked");
    }));
}

/// Main application.
pub struct Application {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
            shutdown: CancellationToken::new(),
        })
    }

    /// Cancel this token to stop every loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Load the admin key, connect to the access node and run until shutdown.
    pub async fn run(self) -> AppResult<()> {
        let keys = KeyRing::load(
            &self.config.ledger.key_source.to_key_source(),
            self.config.ledger.signature_algorithm,
        )?;
        let client = RestLedgerClient::with_timeout(
            self.config.ledger.access_node_url.clone(),
            Duration::from_millis(self.config.ledger.request_timeout_ms),
        )?;
        self.run_with(Arc::new(client), keys).await
    }

    /// Run against a given ledger client and key ring.
    pub async fn run_with(self, client: DynLedgerClient, keys: KeyRing) -> AppResult<()> {
        let config = &self.config;
        info!(
            admin = %config.ledger.admin_address,
            access_node = %config.ledger.access_node_url,
            signing_keys = keys.len(),
            algorithm = ?keys.algorithm(),
            "Starting supreme keeper"
        );
        if let Ok(public_key) = keys.public_key_hex(0) {
            info!(public_key = %public_key, "Admin signing key loaded");
        }

        let pool = Arc::new(KeyPool::with_poll_interval(
            config.key_pool.fallback_key_count,
            Duration::from_millis(config.key_pool.acquire_poll_interval_ms),
        ));
        let submitter = Arc::new(Submitter::new(
            client,
            pool,
            Arc::new(keys),
            config.contract_addresses(),
            config.submitter_config()?,
        ));
        submitter.discover_keys(config.key_pool.fallback_key_count).await;

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        // Oracle pipeline
        let oracle_state = SharedOracleState::new();
        let (tick_tx, tick_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let feed = Arc::new(FeedConnection::with_shutdown(
            config.feed.clone(),
            tick_tx,
            self.shutdown.child_token(),
        ));
        tasks.push(("feed", spawn_feed(Arc::clone(&feed))));

        let pusher = Arc::new(OraclePusher::new(
            Arc::clone(&submitter),
            oracle_state.clone(),
            Arc::clone(&self.clock),
            config.oracle.push_timeout_ms,
        ));
        let ingestor = PriceIngestor::new(
            oracle_state.clone(),
            pusher,
            Arc::clone(&self.clock),
            config.oracle.push_interval_ms,
        );
        tasks.push((
            "ingestor",
            tokio::spawn(ingestor.run(tick_rx, self.shutdown.clone())),
        ));

        let watchdog = Watchdog::new(
            oracle_state.clone(),
            feed,
            Arc::clone(&self.clock),
            config.oracle,
        );
        tasks.push(("watchdog", tokio::spawn(watchdog.run(self.shutdown.clone()))));

        // Keepers
        let sweeper = Arc::new(SettlementSweeper::new(Arc::clone(&submitter), config.settlement));
        tasks.push(("settlement", tokio::spawn(sweeper.run(self.shutdown.clone()))));

        let house = Arc::new(BalanceGuard::new(Arc::clone(&submitter), config.house));
        tasks.push((
            "house",
            tokio::spawn(Arc::clone(&house).run(self.shutdown.clone())),
        ));

        // HTTP API
        if config.api.enabled {
            let state = ApiState::new(
                Arc::clone(&submitter),
                OracleHandle::new(
                    oracle_state,
                    Arc::clone(&self.clock),
                    config.oracle.stale_after_ms,
                ),
                house,
                Arc::clone(&self.clock),
                config.api.clone(),
            );
            let shutdown = self.shutdown.clone();
            tasks.push((
                "api",
                tokio::spawn(async move {
                    if let Err(e) = run_server(state, shutdown).await {
                        error!(error = %e, "API server failed");
                    }
                }),
            ));
        }

        info!(
            pool_size = submitter.pool_size(),
            api = config.api.enabled,
            "Supreme keeper running"
        );

        self.shutdown.cancelled().await;
        info!("Shutdown requested, stopping tasks");

        for (name, handle) in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => warn!(task = name, "Task did not stop in time"),
            }
        }

        info!("Supreme keeper stopped");
        Ok(())
    }
}
