//! Trade feed client for the supreme oracle.
//!
//! Maintains one WebSocket connection to an exchange trade stream and emits
//! `TradeTick`s. Reconnects on a fixed delay; supports forced reconnects
//! from the oracle watchdog.

pub mod connection;
pub mod error;
pub mod message;

pub use connection::{spawn_feed, ConnectionState, FeedConfig, FeedConnection};
pub use error::{FeedError, FeedResult};
pub use message::{parse_trade, AggTrade};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the ring TLS crypto provider. Call before the first `wss://`
/// connection.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
