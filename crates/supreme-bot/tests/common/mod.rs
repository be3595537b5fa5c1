//! Shared fixtures for integration tests.

pub mod mock_trade_server;

use std::sync::Arc;

use serde_json::json;
use supreme_ledger::{KeyRing, MockLedger};

pub const ADMIN: &str = "0x01cf0e2f2f715450";
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn key_ring() -> KeyRing {
    KeyRing::from_hex_list(TEST_KEY).unwrap()
}

/// Mock ledger with `keys` admin keys, no expired positions and a healthy
/// house balance.
pub fn quiet_ledger(keys: u32) -> Arc<MockLedger> {
    let ledger = Arc::new(MockLedger::new(keys));
    ledger.set_script_result("getPositionCount", json!({"type": "Array", "value": []}));
    ledger.set_script_result(
        "getHouseBalance",
        json!({"type": "UFix64", "value": "50000.00000000"}),
    );
    ledger
}

/// Config pointing at `feed_url` with short timings and the API disabled.
pub fn test_config(feed_url: &str, extra: &str) -> supreme_bot::AppConfig {
    supreme_bot::AppConfig::from_toml(&format!(
        r#"
[ledger]
admin_address = "{ADMIN}"
seal_poll_interval_ms = 10

[feed]
url = "{feed_url}"
reconnect_delay_ms = 100

[api]
enabled = false

{extra}
"#
    ))
    .unwrap()
}
