//! Mock trade stream server.
//!
//! Serves `aggTrade` frames to every connection, either continuously or
//! once per connection (to simulate a feed that goes silent).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub enum TradeMode {
    /// One trade every `interval`.
    Stream { interval: Duration },
    /// One trade after connecting, then silence.
    Once,
}

pub struct MockTradeServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl MockTradeServer {
    pub async fn start(mode: TradeMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        let conns = Arc::clone(&connections);
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    Ok((stream, _)) = listener.accept() => {
                        conns.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve(stream, mode, token.clone()));
                    }
                }
            }
        });

        Self {
            addr,
            connections,
            shutdown,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

fn trade(seq: u64) -> String {
    let price = 65_000 + (seq % 7) * 10;
    format!(
        r#"{{"e":"aggTrade","s":"BTCUSDT","p":"{price}.50","q":"0.1","T":{}}}"#,
        1_718_000_000_000u64 + seq * 100
    )
}

async fn serve(stream: TcpStream, mode: TradeMode, shutdown: CancellationToken) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    if write.send(Message::Text(trade(0).into())).await.is_err() {
        return;
    }

    let interval = match mode {
        TradeMode::Stream { interval } => Some(interval),
        TradeMode::Once => None,
    };
    let mut seq = 1;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                _ => {}
            },
            () = async {
                match interval {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                if write.send(Message::Text(trade(seq).into())).await.is_err() {
                    return;
                }
                seq += 1;
            }
        }
    }
}
