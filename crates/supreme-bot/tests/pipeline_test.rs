//! End-to-end tests: trade stream → oracle → ledger, with shutdown.

mod common;

use std::time::Duration;

use common::mock_trade_server::{MockTradeServer, TradeMode};
use supreme_bot::{AppError, Application};
use supreme_ledger::MockLedger;

async fn wait_for(mut condition: impl FnMut() -> bool, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

fn push_count(ledger: &MockLedger) -> usize {
    ledger
        .sent()
        .iter()
        .filter(|tx| tx.body.script.contains("pushRange"))
        .count()
}

#[tokio::test]
async fn test_trades_become_oracle_pushes() {
    let server = MockTradeServer::start(TradeMode::Stream {
        interval: Duration::from_millis(20),
    })
    .await;
    let ledger = common::quiet_ledger(4);
    let config = common::test_config(
        &server.url(),
        "[oracle]\npush_interval_ms = 200\n\n[settlement]\npoll_interval_ms = 100\n",
    );

    let app = Application::new(config).unwrap();
    let shutdown = app.shutdown_token();
    let handle = tokio::spawn(app.run_with(ledger.clone(), common::key_ring()));

    assert!(
        wait_for(|| push_count(&ledger) >= 2, Duration::from_secs(5)).await,
        "expected oracle pushes, got {}",
        push_count(&ledger)
    );

    // Nothing else submits, so pushes never overlap.
    assert_eq!(ledger.max_in_flight(), 1);

    let push = ledger
        .sent()
        .into_iter()
        .find(|tx| tx.body.script.contains("pushRange"))
        .unwrap();
    let args = MockLedger::decoded_arguments(&push);
    assert_eq!(args.len(), 4);
    assert_eq!(args[0]["type"], "UFix64");
    assert!(args[0]["value"].as_str().unwrap().starts_with("650"));
    assert!(push.body.script.contains("import PriceOracle from 0x01cf0e2f2f715450"));

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("application did not stop")
        .unwrap();
    assert!(result.is_ok());
    server.shutdown();
}

#[tokio::test]
async fn test_silent_feed_is_reconnected() {
    let server = MockTradeServer::start(TradeMode::Once).await;
    let ledger = common::quiet_ledger(2);
    let config = common::test_config(
        &server.url(),
        "[oracle]\nsilence_timeout_ms = 300\nwatchdog_interval_ms = 100\n",
    );

    let app = Application::new(config).unwrap();
    let shutdown = app.shutdown_token();
    let handle = tokio::spawn(app.run_with(ledger.clone(), common::key_ring()));

    assert!(
        wait_for(|| server.connection_count() >= 2, Duration::from_secs(5)).await,
        "watchdog never forced a reconnect"
    );

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("application did not stop")
        .unwrap();
    assert!(result.is_ok());
    server.shutdown();
}

#[tokio::test]
async fn test_missing_admin_key_fails_startup() {
    let mut config = common::test_config("ws://127.0.0.1:9", "");
    config.ledger.key_source.env_var = "SUPREME_TEST_KEY_THAT_IS_NOT_SET".to_string();

    let app = Application::new(config).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), app.run())
        .await
        .expect("startup should fail fast");
    assert!(matches!(result, Err(AppError::Key(_))));
}
