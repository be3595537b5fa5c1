//! Trade tick ingestion.

use std::sync::Arc;

use supreme_core::{Clock, TradeTick};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::pusher::{OraclePusher, PushDecision};
use crate::state::SharedOracleState;

/// Folds ticks into the oracle window and hands due windows to the pusher.
pub struct PriceIngestor {
    state: SharedOracleState,
    pusher: Arc<OraclePusher>,
    clock: Arc<dyn Clock>,
    push_interval_ms: u64,
}

impl PriceIngestor {
    pub fn new(
        state: SharedOracleState,
        pusher: Arc<OraclePusher>,
        clock: Arc<dyn Clock>,
        push_interval_ms: u64,
    ) -> Self {
        Self {
            state,
            pusher,
            clock,
            push_interval_ms,
        }
    }

    /// Handle one tick. Returns the push decision when a window closed.
    pub fn on_tick(&self, tick: TradeTick) -> Option<PushDecision> {
        let now_ms = self.clock.now_ms();
        let range = self.state.record_tick(tick, now_ms, self.push_interval_ms)?;
        trace!(high = %range.high, low = %range.low, close = %range.close, "Push window closed");
        Some(self.pusher.push(range))
    }

    /// Consume ticks until the channel closes or shutdown.
    pub async fn run(self, mut ticks: mpsc::Receiver<TradeTick>, shutdown: CancellationToken) {
        info!(push_interval_ms = self.push_interval_ms, "PriceIngestor started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                tick = ticks.recv() => match tick {
                    Some(tick) => match self.on_tick(tick) {
                        Some(PushDecision::Spawned { recovered, handle }) => {
                            // Detached; the pusher records its own outcome.
                            drop(handle);
                            trace!(recovered, "Oracle push spawned");
                        }
                        Some(PushDecision::Dropped) => {
                            debug!("Push window dropped, previous push still in flight");
                        }
                        None => {}
                    },
                    None => break,
                },
            }
        }
        info!("PriceIngestor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pusher::tests::{submitter, T0};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use supreme_core::{ManualClock, Price};
    use supreme_ledger::MockLedger;

    fn tick(price: Decimal) -> TradeTick {
        TradeTick {
            price: Price::new(price),
            trade_time_ms: T0,
        }
    }

    fn setup(ledger: Arc<MockLedger>) -> (PriceIngestor, SharedOracleState, Arc<ManualClock>) {
        let state = SharedOracleState::new();
        let clock = Arc::new(ManualClock::new(T0));
        let pusher = Arc::new(OraclePusher::new(
            submitter(ledger, 2),
            state.clone(),
            clock.clone(),
            30_000,
        ));
        (
            PriceIngestor::new(state.clone(), pusher, clock.clone(), 4000),
            state,
            clock,
        )
    }

    #[tokio::test]
    async fn test_push_cadence_follows_interval() {
        let ledger = Arc::new(MockLedger::new(2));
        let (ingestor, state, clock) = setup(ledger.clone());

        // First tick: never pushed before, so due at once.
        let Some(PushDecision::Spawned { handle, .. }) = ingestor.on_tick(tick(dec!(10))) else {
            panic!("first tick should push");
        };
        handle.await.unwrap();
        assert_eq!(ledger.sent_count(), 1);

        for p in [dec!(12), dec!(8), dec!(11)] {
            clock.advance(1_000);
            assert!(ingestor.on_tick(tick(p)).is_none());
        }
        let s = state.snapshot();
        assert_eq!(s.interval_high, Some(Price::new(dec!(12))));
        assert_eq!(s.interval_low, Some(Price::new(dec!(8))));

        clock.advance(1_000);
        let Some(PushDecision::Spawned { handle, .. }) = ingestor.on_tick(tick(dec!(9))) else {
            panic!("tick after interval should push");
        };
        handle.await.unwrap();
        assert_eq!(ledger.sent_count(), 2);
        assert_eq!(state.snapshot().interval_high, Some(Price::new(dec!(9))));
    }

    #[tokio::test]
    async fn test_ticks_keep_flowing_while_push_in_flight() {
        let ledger = Arc::new(MockLedger::new(2));
        ledger.set_send_delay(Duration::from_millis(300));
        let (ingestor, state, clock) = setup(ledger.clone());

        let first = ingestor.on_tick(tick(dec!(10)));
        assert!(first.is_some());
        for p in [dec!(20), dec!(5)] {
            clock.advance(5_000);
            // Slot busy: no snapshot taken, window keeps widening.
            assert!(ingestor.on_tick(tick(p)).is_none());
        }
        let s = state.snapshot();
        assert_eq!(s.interval_high, Some(Price::new(dec!(20))));
        assert_eq!(s.interval_low, Some(Price::new(dec!(5))));
        assert_eq!(s.latest_price, Some(Price::new(dec!(5))));
    }

    #[tokio::test]
    async fn test_run_pushes_each_due_window() {
        let ledger = Arc::new(MockLedger::new(2));
        let (ingestor, state, clock) = setup(ledger.clone());
        let (tx, rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(ingestor.run(rx, shutdown.clone()));

        let wait_sent = |n: usize| {
            let ledger = ledger.clone();
            async move {
                tokio::time::timeout(Duration::from_secs(2), async {
                    while ledger.sent_count() < n {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                })
                .await
                .unwrap();
            }
        };

        tx.send(tick(dec!(10))).await.unwrap();
        wait_sent(1).await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while state.snapshot().is_pushing {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        clock.advance(5_000);
        tx.send(tick(dec!(11))).await.unwrap();
        wait_sent(2).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let ledger = Arc::new(MockLedger::new(1));
        let (ingestor, state, _clock) = setup(ledger);
        let (tx, rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(ingestor.run(rx, shutdown.clone()));

        tx.send(tick(dec!(42))).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while state.latest_price().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
