//! Trade feed message parsing.
//!
//! Binance `aggTrade` events, either raw (`/ws/btcusdt@aggTrade`) or wrapped
//! by the combined-stream endpoint (`{"stream": ..., "data": {...}}`).

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use supreme_core::{Price, TradeTick};

use crate::error::{FeedError, FeedResult};

/// Aggregate trade event. Only the fields the oracle needs.
#[derive(Debug, Clone, Deserialize)]
pub struct AggTrade {
    /// Event type, `"aggTrade"`.
    #[serde(rename = "e", default)]
    pub event_type: String,
    /// Symbol, e.g. `"BTCUSDT"`.
    #[serde(rename = "s", default)]
    pub symbol: String,
    /// Price as a decimal string.
    #[serde(rename = "p")]
    pub price: String,
    /// Trade time (ms since epoch).
    #[serde(rename = "T")]
    pub trade_time: u64,
}

impl AggTrade {
    pub fn to_tick(&self) -> FeedResult<TradeTick> {
        let price: Decimal = self
            .price
            .parse()
            .map_err(|e| FeedError::Parse(format!("price {:?}: {e}", self.price)))?;
        if price <= Decimal::ZERO {
            return Err(FeedError::Parse(format!("non-positive price {price}")));
        }
        Ok(TradeTick {
            price: Price::new(price),
            trade_time_ms: self.trade_time,
        })
    }
}

/// Parse one text frame.
///
/// Returns `Ok(None)` for frames that are not trades (subscription acks,
/// other event types).
pub fn parse_trade(text: &str) -> FeedResult<Option<TradeTick>> {
    let value: Value = serde_json::from_str(text)?;
    let event = match value.get("data") {
        Some(inner) if value.get("stream").is_some() => inner,
        _ => &value,
    };

    let is_trade = match event.get("e").and_then(Value::as_str) {
        Some(kind) => kind == "aggTrade" || kind == "trade",
        None => event.get("p").is_some() && event.get("T").is_some(),
    };
    if !is_trade {
        return Ok(None);
    }

    let trade: AggTrade = serde_json::from_value(event.clone())?;
    trade.to_tick().map(Some)
}
