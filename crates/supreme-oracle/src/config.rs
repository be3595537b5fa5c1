//! Oracle timing configuration.

use serde::Deserialize;

fn default_push_interval_ms() -> u64 {
    4000
}

fn default_push_timeout_ms() -> u64 {
    30_000
}

fn default_silence_timeout_ms() -> u64 {
    15_000
}

fn default_watchdog_interval_ms() -> u64 {
    5000
}

fn default_stale_after_ms() -> u64 {
    30_000
}

/// Timing thresholds for the oracle pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OracleConfig {
    /// Minimum gap between successful pushes.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,
    /// A push running longer than this is considered stuck.
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,
    /// No tick for this long forces a feed reconnect.
    #[serde(default = "default_silence_timeout_ms")]
    pub silence_timeout_ms: u64,
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    /// Health reports stale once the last push is older than this.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            push_interval_ms: default_push_interval_ms(),
            push_timeout_ms: default_push_timeout_ms(),
            silence_timeout_ms: default_silence_timeout_ms(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}
