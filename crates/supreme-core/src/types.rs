//! Common data types shared across the keeper.

use crate::decimal::Price;
use serde::{Deserialize, Serialize};

/// A single trade observed on the external price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    /// Trade price.
    pub price: Price,
    /// Trade time reported by the feed (ms since epoch).
    pub trade_time_ms: u64,
}

/// High/low/close envelope captured for one oracle push window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub high: Price,
    pub low: Price,
    pub close: Price,
    /// Unix seconds of the closing trade.
    pub timestamp_secs: u64,
}

/// Event emitted by a sealed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Fully qualified event type, e.g. `A.0123.PredictionGame.PositionSettled`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event fields converted to plain JSON.
    pub data: serde_json::Value,
}

/// Outcome of a sealed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Transaction id (hex).
    pub id: String,
    /// Ledger status code (0 = success).
    pub status_code: u32,
    /// Emitted events in order.
    pub events: Vec<LedgerEvent>,
}

impl TransactionResult {
    /// First event whose type ends with `.{name}` (or equals `name`).
    pub fn find_event(&self, name: &str) -> Option<&LedgerEvent> {
        let suffix = format!(".{name}");
        self.events
            .iter()
            .find(|e| e.event_type == name || e.event_type.ends_with(&suffix))
    }

    /// Short id prefix for log lines.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_event_by_suffix() {
        let result = TransactionResult {
            id: "4f1c9a0e77aa".to_string(),
            status_code: 0,
            events: vec![
                LedgerEvent {
                    event_type: "A.0ae53cb6e3f42a79.FlowToken.TokensWithdrawn".to_string(),
                    data: json!({}),
                },
                LedgerEvent {
                    event_type: "A.01cf0e2f2f715450.PredictionGame.PositionSettled".to_string(),
                    data: json!({"won": false}),
                },
            ],
        };

        let settled = result.find_event("PositionSettled").unwrap();
        assert_eq!(settled.data["won"], json!(false));
        assert!(result.find_event("Settled").is_none());
        assert_eq!(result.short_id(), "4f1c9a0e");
    }
}
