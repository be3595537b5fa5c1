//! Trade feed connection manager.
//!
//! Keeps one WebSocket open to the trade stream and forwards every parsed
//! trade on an mpsc channel. Any disconnect is followed by a fixed-delay
//! reconnect. [`FeedConnection::force_reconnect`] drops the current
//! connection (or aborts a pending handshake) and reconnects at once; it is
//! a no-op between attempts. A handshake that takes longer than
//! `connect_timeout_ms` counts as a failed attempt.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use supreme_core::TradeTick;
use supreme_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{FeedError, FeedResult};
use crate::message::parse_trade;

fn default_url() -> String {
    "wss://stream.binance.com:9443/ws/btcusdt@aggTrade".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Feed connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Fixed delay before reconnecting after a disconnect.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Upper bound on TCP connect plus TLS/WebSocket handshake.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Trade feed connection manager.
pub struct FeedConnection {
    config: FeedConfig,
    state: RwLock<ConnectionState>,
    tick_tx: mpsc::Sender<TradeTick>,
    /// Token of the current attempt (handshake or open connection);
    /// cancelled to force a reconnect.
    live: Mutex<Option<CancellationToken>>,
    forced: AtomicBool,
    reconnect_count: AtomicU32,
    shutdown_token: CancellationToken,
}

impl FeedConnection {
    pub fn new(config: FeedConfig, tick_tx: mpsc::Sender<TradeTick>) -> Self {
        Self::with_shutdown(config, tick_tx, CancellationToken::new())
    }

    /// Create a connection that stops when `shutdown_token` is cancelled.
    pub fn with_shutdown(
        config: FeedConfig,
        tick_tx: mpsc::Sender<TradeTick>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            tick_tx,
            live: Mutex::new(None),
            forced: AtomicBool::new(false),
            reconnect_count: AtomicU32::new(0),
            shutdown_token,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Reconnects since start.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::SeqCst)
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("Feed shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Close the current connection, or abort a handshake in progress, and
    /// reconnect without the usual delay.
    ///
    /// Returns `false` (and does nothing) between attempts.
    pub fn force_reconnect(&self) -> bool {
        let Some(token) = self.live.lock().take() else {
            debug!("Forced reconnect requested with no connection attempt");
            return false;
        };
        self.forced.store(true, Ordering::SeqCst);
        token.cancel();
        Metrics::feed_reconnect("forced");
        true
    }

    /// Connect and keep reconnecting until shutdown.
    pub async fn run(&self) {
        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting feed loop");
                *self.state.write() = ConnectionState::Disconnected;
                return;
            }

            *self.state.write() = ConnectionState::Connecting;

            match self.try_connect().await {
                Ok(()) => info!("Feed connection closed"),
                Err(FeedError::Disconnected) => info!("Feed connection dropped"),
                Err(e) => {
                    error!(error = %e, "Feed connection error");
                    Metrics::feed_reconnect("error");
                }
            }
            *self.live.lock() = None;

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                *self.state.write() = ConnectionState::Disconnected;
                return;
            }

            self.reconnect_count.fetch_add(1, Ordering::SeqCst);
            *self.state.write() = ConnectionState::Reconnecting;

            if self.forced.swap(false, Ordering::SeqCst) {
                warn!("Reconnecting feed immediately");
                continue;
            }

            let delay = Duration::from_millis(self.config.reconnect_delay_ms);
            warn!(delay_ms = self.config.reconnect_delay_ms, "Feed disconnected, reconnecting");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during reconnect delay, exiting");
                    *self.state.write() = ConnectionState::Disconnected;
                    return;
                }
            }
        }
    }

    async fn try_connect(&self) -> FeedResult<()> {
        info!(url = %self.config.url, "Connecting to trade feed");

        let connection_token = self.shutdown_token.child_token();
        *self.live.lock() = Some(connection_token.clone());

        let timeout_ms = self.config.connect_timeout_ms;
        let handshake = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            connect_async_tls_with_config(&self.config.url, None, true, None),
        );
        let (ws_stream, _response) = tokio::select! {
            () = connection_token.cancelled() => {
                info!("Feed handshake aborted");
                return Err(FeedError::Disconnected);
            }
            res = handshake => match res {
                Ok(connected) => connected?,
                Err(_) => {
                    return Err(FeedError::ConnectionFailed(format!(
                        "handshake timed out after {timeout_ms}ms"
                    )))
                }
            },
        };
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        info!("Trade feed connected");

        loop {
            tokio::select! {
                () = connection_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Failed to send Close frame");
                    }
                    return Err(FeedError::Disconnected);
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Trade feed closed by server");
                            Metrics::feed_reconnect("closed");
                            return Err(FeedError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("Trade feed stream ended");
                            Metrics::feed_reconnect("closed");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        match parse_trade(text) {
            Ok(Some(tick)) => {
                Metrics::feed_tick();
                if self.tick_tx.send(tick).await.is_err() {
                    warn!("Tick receiver dropped");
                }
            }
            Ok(None) => debug!("Ignoring non-trade frame"),
            // A single malformed frame never drops the connection.
            Err(e) => debug!(error = %e, "Unparseable feed frame"),
        }
    }
}

/// Spawn the feed loop on the runtime.
pub fn spawn_feed(connection: Arc<FeedConnection>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { connection.run().await })
}
