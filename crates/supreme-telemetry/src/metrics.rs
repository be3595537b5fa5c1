//! Prometheus metrics for the supreme keeper.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which is a programming error surfaced on
//! first use during startup.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

// =============================================================================
// Key pool
// =============================================================================

/// Number of signing keys in the pool.
pub static KEY_POOL_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("supreme_key_pool_size", "Number of admin key slots").unwrap()
});

/// Number of key slots currently reserved by in-flight submissions.
pub static KEY_POOL_BUSY: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "supreme_key_pool_busy",
        "Key slots currently held by in-flight submissions"
    )
    .unwrap()
});

/// Acquisitions that failed because every key was busy.
pub static KEY_POOL_EXHAUSTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "supreme_key_pool_exhausted_total",
        "Key acquisitions that failed with PoolExhausted"
    )
    .unwrap()
});

// =============================================================================
// Submissions
// =============================================================================

/// Transactions by kind and outcome.
/// Labels: kind (oracle_push/settle/house_topup/fund_account/other), outcome (sealed/failed/pool_exhausted)
pub static TX_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "supreme_tx_total",
        "Submitted transactions by kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap()
});

/// Time from broadcast to seal.
pub static TX_SEAL_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "supreme_tx_seal_latency_ms",
        "Broadcast-to-seal latency in milliseconds",
        &["kind"],
        vec![500.0, 1000.0, 2000.0, 4000.0, 8000.0, 15000.0, 30000.0, 60000.0]
    )
    .unwrap()
});

// =============================================================================
// Oracle
// =============================================================================

/// Oracle pushes by outcome.
/// Labels: outcome (sealed/failed/dropped/recovered)
pub static ORACLE_PUSH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "supreme_oracle_push_total",
        "Oracle push attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Milliseconds since the last successful oracle push.
pub static ORACLE_LAST_PUSH_AGE_MS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "supreme_oracle_last_push_age_ms",
        "Milliseconds since the last successful oracle push"
    )
    .unwrap()
});

/// Feed ticks received.
pub static FEED_TICKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("supreme_feed_ticks_total", "Trade ticks received").unwrap()
});

/// Feed reconnects by reason.
/// Labels: reason (closed/error/forced)
pub static FEED_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "supreme_feed_reconnect_total",
        "Trade feed reconnects by reason",
        &["reason"]
    )
    .unwrap()
});

/// Watchdog interventions by kind.
/// Labels: kind (silent_feed/stuck_push)
pub static WATCHDOG_RECOVERY_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "supreme_watchdog_recovery_total",
        "Watchdog forced recoveries by kind",
        &["kind"]
    )
    .unwrap()
});

// =============================================================================
// Keepers
// =============================================================================

/// Settlement attempts by outcome.
/// Labels: outcome (settled/failed)
pub static SETTLEMENT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "supreme_settlement_total",
        "Position settlement attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Settlement candidates seen in the most recent cycle.
pub static SETTLEMENT_BACKLOG: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "supreme_settlement_backlog",
        "Expired unsettled positions seen in the last sweep"
    )
    .unwrap()
});

/// House top-ups by outcome.
/// Labels: outcome (funded/failed)
pub static HOUSE_TOPUP_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "supreme_house_topup_total",
        "House pool top-ups by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn key_pool_size(size: usize) {
        KEY_POOL_SIZE.set(size as i64);
    }

    pub fn key_pool_busy(busy: usize) {
        KEY_POOL_BUSY.set(busy as i64);
    }

    pub fn key_pool_exhausted() {
        KEY_POOL_EXHAUSTED_TOTAL.inc();
    }

    /// Record a transaction outcome.
    pub fn tx(kind: &str, outcome: &str) {
        TX_TOTAL.with_label_values(&[kind, outcome]).inc();
    }

    pub fn tx_seal_latency(kind: &str, latency_ms: f64) {
        TX_SEAL_LATENCY_MS
            .with_label_values(&[kind])
            .observe(latency_ms);
    }

    pub fn oracle_push(outcome: &str) {
        ORACLE_PUSH_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn oracle_last_push_age(age_ms: u64) {
        ORACLE_LAST_PUSH_AGE_MS.set(age_ms.min(i64::MAX as u64) as i64);
    }

    pub fn feed_tick() {
        FEED_TICKS_TOTAL.inc();
    }

    pub fn feed_reconnect(reason: &str) {
        FEED_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn watchdog_recovery(kind: &str) {
        WATCHDOG_RECOVERY_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn settlement(outcome: &str) {
        SETTLEMENT_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn settlement_backlog(count: usize) {
        SETTLEMENT_BACKLOG.set(count as i64);
    }

    pub fn house_topup(outcome: &str) {
        HOUSE_TOPUP_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Render every registered metric in the prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let families = prometheus::gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
