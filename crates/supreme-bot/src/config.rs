//! Application configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use supreme_api::ApiConfig;
use supreme_feed::FeedConfig;
use supreme_keeper::{HouseConfig, SettlementConfig};
use supreme_ledger::{ContractAddresses, FlowAddress, KeySource, SignatureAlgorithm, SubmitterConfig};
use supreme_oracle::OracleConfig;

use crate::error::{AppError, AppResult};

/// Flow ledger access.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_access_node_url")]
    pub access_node_url: String,
    /// Custodial admin account.
    pub admin_address: String,
    #[serde(default)]
    pub key_source: KeySourceConfig,
    /// Algorithm the admin keys are registered with on the account.
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,
    /// Import alias to deployed address, e.g. `PredictionGame = "0x..."`.
    #[serde(default)]
    pub contracts: BTreeMap<String, String>,
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    #[serde(default = "default_seal_poll_interval_ms")]
    pub seal_poll_interval_ms: u64,
    #[serde(default = "default_seal_timeout_ms")]
    pub seal_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_access_node_url() -> String {
    "https://rest-testnet.onflow.org".to_string()
}

fn default_gas_limit() -> u64 {
    9999
}

fn default_seal_poll_interval_ms() -> u64 {
    1000
}

fn default_seal_timeout_ms() -> u64 {
    120_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Where the admin private key comes from. Never the key itself.
#[derive(Debug, Clone, Deserialize)]
pub struct KeySourceConfig {
    /// Environment variable holding the hex key (or comma-separated keys).
    #[serde(default = "default_key_env_var")]
    pub env_var: String,
    /// Key file; takes precedence over `env_var` when set.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_key_env_var() -> String {
    "FLOW_ADMIN_PRIVATE_KEY".to_string()
}

impl Default for KeySourceConfig {
    fn default() -> Self {
        Self {
            env_var: default_key_env_var(),
            file: None,
        }
    }
}

impl KeySourceConfig {
    pub fn to_key_source(&self) -> KeySource {
        match &self.file {
            Some(path) => KeySource::File { path: path.clone() },
            None => KeySource::EnvVar {
                var_name: self.env_var.clone(),
            },
        }
    }
}

/// Key pool tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct KeyPoolConfig {
    #[serde(default = "default_acquire_poll_interval_ms")]
    pub acquire_poll_interval_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Pool size used when key discovery fails.
    #[serde(default = "default_fallback_key_count")]
    pub fallback_key_count: usize,
}

fn default_acquire_poll_interval_ms() -> u64 {
    500
}

fn default_acquire_timeout_ms() -> u64 {
    15_000
}

fn default_fallback_key_count() -> usize {
    1
}

impl Default for KeyPoolConfig {
    fn default() -> Self {
        Self {
            acquire_poll_interval_ms: default_acquire_poll_interval_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            fallback_key_count: default_fallback_key_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub key_pool: KeyPoolConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub house: HouseConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall a loop or break submission.
    pub fn validate(&self) -> AppResult<()> {
        self.admin_address()?;

        let intervals = [
            ("oracle.push_interval_ms", self.oracle.push_interval_ms),
            ("oracle.push_timeout_ms", self.oracle.push_timeout_ms),
            ("oracle.silence_timeout_ms", self.oracle.silence_timeout_ms),
            ("oracle.watchdog_interval_ms", self.oracle.watchdog_interval_ms),
            ("settlement.poll_interval_ms", self.settlement.poll_interval_ms),
            ("house.check_interval_ms", self.house.check_interval_ms),
            ("key_pool.acquire_poll_interval_ms", self.key_pool.acquire_poll_interval_ms),
            ("ledger.seal_poll_interval_ms", self.ledger.seal_poll_interval_ms),
            ("feed.connect_timeout_ms", self.feed.connect_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(AppError::Config(format!("{name} must be greater than zero")));
        }

        if self.key_pool.fallback_key_count == 0 {
            return Err(AppError::Config(
                "key_pool.fallback_key_count must be at least 1".to_string(),
            ));
        }
        if self.house.top_up_amount <= rust_decimal::Decimal::ZERO {
            return Err(AppError::Config("house.top_up_amount must be positive".to_string()));
        }
        for (name, address) in &self.ledger.contracts {
            address.parse::<FlowAddress>().map_err(|_| {
                AppError::Config(format!("ledger.contracts.{name}: invalid address {address}"))
            })?;
        }
        Ok(())
    }

    pub fn admin_address(&self) -> AppResult<FlowAddress> {
        self.ledger.admin_address.parse().map_err(|_| {
            AppError::Config(format!(
                "ledger.admin_address: invalid address {}",
                self.ledger.admin_address
            ))
        })
    }

    /// Contract aliases; the admin account hosts every contract not listed.
    pub fn contract_addresses(&self) -> ContractAddresses {
        let mut contracts: ContractAddresses = [
            "PriceOracle",
            "PriceRangeOracle",
            "PredictionGame",
            "MockPYUSD",
        ]
        .into_iter()
        .map(|name| (name, self.ledger.admin_address.as_str()))
        .collect();
        contracts.insert("FungibleToken", "0x9a0766d93b6608b7");
        contracts.insert("FlowToken", "0x7e60df042a9c0868");
        for (name, address) in &self.ledger.contracts {
            contracts.insert(name.clone(), address);
        }
        contracts
    }

    pub fn submitter_config(&self) -> AppResult<SubmitterConfig> {
        let mut config = SubmitterConfig::new(self.admin_address()?);
        config.default_gas_limit = self.ledger.default_gas_limit;
        config.acquire_timeout = Duration::from_millis(self.key_pool.acquire_timeout_ms);
        config.seal_poll_interval = Duration::from_millis(self.ledger.seal_poll_interval_ms);
        config.seal_timeout = Duration::from_millis(self.ledger.seal_timeout_ms);
        Ok(config)
    }
}
