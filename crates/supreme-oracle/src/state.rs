//! Process-wide oracle state.
//!
//! One [`OracleState`] is shared by the ingestor (writes price/tick fields),
//! the pusher (writes push fields) and the watchdog (forces recovery). Each
//! writer goes through a narrow method on [`SharedOracleState`]; all methods
//! take `now_ms` explicitly so the caller's clock decides time.

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use supreme_core::{Price, PriceRange, TradeTick};
use tokio_util::sync::CancellationToken;

/// Raw state. Read via [`SharedOracleState::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct OracleState {
    pub latest_price: Option<Price>,
    /// Local time of the last tick, or of the last forced reconnect.
    pub last_tick_at_ms: Option<u64>,
    /// Feed-reported time of the last trade.
    pub latest_trade_time_ms: u64,
    /// `None` until the first tick of a window seeds it.
    pub interval_high: Option<Price>,
    pub interval_low: Option<Price>,
    pub is_pushing: bool,
    pub push_started_at_ms: u64,
    /// 0 until the first successful push.
    pub last_push_at_ms: u64,
    /// Incremented per push; stale completions compare against it.
    pub push_generation: u64,
    push_cancel: Option<CancellationToken>,
}

/// Outcome of [`SharedOracleState::try_begin_push`].
#[derive(Debug, Clone)]
pub enum PushStart {
    /// No push was running; this one owns the slot.
    Started(PushTicket),
    /// A push was running past the timeout; it was cancelled and this one
    /// owns the slot.
    Recovered { ticket: PushTicket, stuck_for_ms: u64 },
    /// A push is in flight and still within its timeout.
    Dropped,
}

/// Ownership of the single push slot.
#[derive(Debug, Clone)]
pub struct PushTicket {
    pub generation: u64,
    pub cancel: CancellationToken,
}

/// Oracle freshness as reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleHealth {
    /// Latest feed price, if any tick has arrived.
    pub price: Option<Decimal>,
    /// Time since the last successful push (since epoch if never pushed).
    pub last_push_age_ms: u64,
    pub is_stale: bool,
}

/// Cloneable handle to the shared state.
#[derive(Debug, Clone, Default)]
pub struct SharedOracleState {
    inner: Arc<Mutex<OracleState>>,
}

impl SharedOracleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> OracleState {
        self.inner.lock().clone()
    }

    pub fn latest_price(&self) -> Option<Price> {
        self.inner.lock().latest_price
    }

    /// Fold a tick into the current window.
    ///
    /// The first tick of a window seeds both bounds; later ticks only widen
    /// them. Returns the window snapshot and resets the window to the latest
    /// price when a push is due: `push_interval_ms` has passed since the last
    /// successful push and no push is in flight.
    pub fn record_tick(&self, tick: TradeTick, now_ms: u64, push_interval_ms: u64) -> Option<PriceRange> {
        let mut state = self.inner.lock();
        let price = tick.price;

        state.latest_price = Some(price);
        state.latest_trade_time_ms = tick.trade_time_ms;
        state.last_tick_at_ms = Some(now_ms);
        state.interval_high = Some(state.interval_high.map_or(price, |h| h.max(price)));
        state.interval_low = Some(state.interval_low.map_or(price, |l| l.min(price)));

        let due = now_ms.saturating_sub(state.last_push_at_ms) >= push_interval_ms;
        if !due || state.is_pushing {
            return None;
        }

        let range = PriceRange {
            high: state.interval_high.unwrap_or(price),
            low: state.interval_low.unwrap_or(price),
            close: price,
            timestamp_secs: tick.trade_time_ms / 1000,
        };
        state.interval_high = Some(price);
        state.interval_low = Some(price);
        Some(range)
    }

    /// Claim the push slot.
    ///
    /// A push older than `push_timeout_ms` is cancelled and replaced.
    pub fn try_begin_push(&self, now_ms: u64, push_timeout_ms: u64) -> PushStart {
        let mut state = self.inner.lock();

        let stuck_for_ms = if state.is_pushing {
            let elapsed = now_ms.saturating_sub(state.push_started_at_ms);
            if elapsed <= push_timeout_ms {
                return PushStart::Dropped;
            }
            Some(elapsed)
        } else {
            None
        };

        if let Some(token) = state.push_cancel.take() {
            token.cancel();
        }
        state.push_generation += 1;
        state.is_pushing = true;
        state.push_started_at_ms = now_ms;
        let cancel = CancellationToken::new();
        state.push_cancel = Some(cancel.clone());

        let ticket = PushTicket {
            generation: state.push_generation,
            cancel,
        };
        match stuck_for_ms {
            Some(stuck_for_ms) => PushStart::Recovered { ticket, stuck_for_ms },
            None => PushStart::Started(ticket),
        }
    }

    /// Release the push slot. Ignored if the slot was since reclaimed.
    ///
    /// Returns whether the completion was applied.
    pub fn finish_push(&self, generation: u64, success: bool, now_ms: u64) -> bool {
        let mut state = self.inner.lock();
        if !state.is_pushing || state.push_generation != generation {
            return false;
        }
        state.is_pushing = false;
        state.push_cancel = None;
        if success {
            state.last_push_at_ms = now_ms;
        }
        true
    }

    /// Watchdog: clear a push running longer than `push_timeout_ms`.
    ///
    /// Returns how long it had been running if it was cleared.
    pub fn clear_stuck_push(&self, now_ms: u64, push_timeout_ms: u64) -> Option<u64> {
        let mut state = self.inner.lock();
        if !state.is_pushing {
            return None;
        }
        let elapsed = now_ms.saturating_sub(state.push_started_at_ms);
        if elapsed <= push_timeout_ms {
            return None;
        }
        state.is_pushing = false;
        if let Some(token) = state.push_cancel.take() {
            token.cancel();
        }
        Some(elapsed)
    }

    /// Watchdog: detect a silent feed.
    ///
    /// Only after at least one tick. On detection `last_tick_at_ms` is
    /// bumped to `now_ms` so the next check does not fire again while the
    /// feed reconnects. Returns the silence duration if detected.
    pub fn check_silent_feed(&self, now_ms: u64, silence_timeout_ms: u64) -> Option<u64> {
        let mut state = self.inner.lock();
        let last = state.last_tick_at_ms?;
        let silent_for = now_ms.saturating_sub(last);
        if silent_for <= silence_timeout_ms {
            return None;
        }
        state.last_tick_at_ms = Some(now_ms);
        Some(silent_for)
    }

    /// Pure read. Stale when the last push is more than `stale_after_ms` old.
    pub fn health(&self, now_ms: u64, stale_after_ms: u64) -> OracleHealth {
        let state = self.inner.lock();
        let age = now_ms.saturating_sub(state.last_push_at_ms);
        OracleHealth {
            price: state.latest_price.map(|p| p.inner()),
            last_push_age_ms: age,
            is_stale: age > stale_after_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const T0: u64 = 1_700_000_000_000;

    fn tick(price: Decimal, trade_time_ms: u64) -> TradeTick {
        TradeTick {
            price: Price::new(price),
            trade_time_ms,
        }
    }

    #[test]
    fn test_envelope_accumulates_and_reseeds() {
        let state = SharedOracleState::new();
        // Pretend a push just happened so the ticks below are not due yet.
        state.inner.lock().last_push_at_ms = T0;

        for (i, p) in [dec!(10), dec!(12), dec!(8), dec!(11)].into_iter().enumerate() {
            assert!(state.record_tick(tick(p, T0 + i as u64), T0 + 100, 4000).is_none());
        }
        let s = state.snapshot();
        assert_eq!(s.interval_high, Some(Price::new(dec!(12))));
        assert_eq!(s.interval_low, Some(Price::new(dec!(8))));
        assert_eq!(s.latest_price, Some(Price::new(dec!(11))));

        // Next tick after the interval triggers a snapshot.
        let range = state
            .record_tick(tick(dec!(11), T0 + 4_500), T0 + 4_000, 4000)
            .unwrap();
        assert_eq!(range.high.inner(), dec!(12));
        assert_eq!(range.low.inner(), dec!(8));
        assert_eq!(range.close.inner(), dec!(11));
        assert_eq!(range.timestamp_secs, (T0 + 4_500) / 1000);

        let s = state.snapshot();
        assert_eq!(s.interval_high, Some(Price::new(dec!(11))));
        assert_eq!(s.interval_low, Some(Price::new(dec!(11))));
    }

    #[test]
    fn test_first_tick_is_due_immediately() {
        let state = SharedOracleState::new();
        let range = state.record_tick(tick(dec!(50), T0), T0, 4000).unwrap();
        assert_eq!(range.high, range.low);
    }

    #[test]
    fn test_no_snapshot_while_pushing() {
        let state = SharedOracleState::new();
        assert!(matches!(state.try_begin_push(T0, 30_000), PushStart::Started(_)));
        assert!(state.record_tick(tick(dec!(50), T0), T0 + 10_000, 4000).is_none());
    }

    #[test]
    fn test_second_push_dropped_within_timeout() {
        let state = SharedOracleState::new();
        let PushStart::Started(first) = state.try_begin_push(T0, 30_000) else {
            panic!("expected start");
        };
        assert!(matches!(state.try_begin_push(T0 + 30_000, 30_000), PushStart::Dropped));

        assert!(state.finish_push(first.generation, true, T0 + 1_000));
        assert_eq!(state.snapshot().last_push_at_ms, T0 + 1_000);
        assert!(matches!(state.try_begin_push(T0 + 2_000, 30_000), PushStart::Started(_)));
    }

    #[test]
    fn test_stuck_push_is_recovered_by_next_push() {
        let state = SharedOracleState::new();
        let PushStart::Started(first) = state.try_begin_push(T0, 30_000) else {
            panic!("expected start");
        };

        match state.try_begin_push(T0 + 30_001, 30_000) {
            PushStart::Recovered { ticket, stuck_for_ms } => {
                assert_eq!(stuck_for_ms, 30_001);
                assert!(first.cancel.is_cancelled());
                assert_eq!(ticket.generation, first.generation + 1);
            }
            other => panic!("expected recovery, got {other:?}"),
        }

        // The abandoned push finishing late does not clear the new one.
        assert!(!state.finish_push(first.generation, true, T0 + 31_000));
        assert!(state.snapshot().is_pushing);
        assert_eq!(state.snapshot().last_push_at_ms, 0);
    }

    #[test]
    fn test_watchdog_clears_stuck_push() {
        let state = SharedOracleState::new();
        let PushStart::Started(ticket) = state.try_begin_push(T0, 30_000) else {
            panic!("expected start");
        };
        assert_eq!(state.clear_stuck_push(T0 + 30_000, 30_000), None);
        assert_eq!(state.clear_stuck_push(T0 + 31_000, 30_000), Some(31_000));
        assert!(ticket.cancel.is_cancelled());
        assert!(!state.snapshot().is_pushing);
        // Idempotent.
        assert_eq!(state.clear_stuck_push(T0 + 32_000, 30_000), None);
        assert!(matches!(state.try_begin_push(T0 + 32_000, 30_000), PushStart::Started(_)));
    }

    #[test]
    fn test_silent_feed_detection() {
        let state = SharedOracleState::new();
        // Never ticked: never silent.
        assert_eq!(state.check_silent_feed(T0 + 1_000_000, 15_000), None);

        state.record_tick(tick(dec!(1), T0), T0, 4000);
        assert_eq!(state.check_silent_feed(T0 + 15_000, 15_000), None);
        assert_eq!(state.check_silent_feed(T0 + 15_001, 15_000), Some(15_001));
        // Bumped: the following check does not re-fire.
        assert_eq!(state.check_silent_feed(T0 + 20_000, 15_000), None);
        assert_eq!(state.snapshot().last_tick_at_ms, Some(T0 + 15_001));
    }

    #[test]
    fn test_health_stale_boundary() {
        let state = SharedOracleState::new();
        state.record_tick(tick(dec!(64000.5), T0), T0, 4000);
        let PushStart::Started(t) = state.try_begin_push(T0, 30_000) else {
            panic!("expected start");
        };
        state.finish_push(t.generation, true, T0);

        let at_limit = state.health(T0 + 30_000, 30_000);
        assert_eq!(at_limit.last_push_age_ms, 30_000);
        assert!(!at_limit.is_stale);

        let past = state.health(T0 + 30_001, 30_000);
        assert!(past.is_stale);
        assert_eq!(past.price, Some(dec!(64000.5)));
    }

    #[test]
    fn test_health_before_any_push_is_stale() {
        let state = SharedOracleState::new();
        let health = state.health(T0, 30_000);
        assert!(health.is_stale);
        assert_eq!(health.price, None);
    }
}
