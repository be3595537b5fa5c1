//! Cadence argument values and JSON-Cadence decoding.
//!
//! Arguments are sent to the ledger in the JSON-Cadence interchange format
//! (`{"type": "UFix64", "value": "1.00000000"}`). Script results and event
//! payloads come back in the same format and are decoded with the helpers
//! below.

use crate::decimal::format_ufix64;
use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed Cadence argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CadenceValue {
    UFix64(String),
    UInt64(String),
    Address(String),
    String(String),
    Bool(bool),
    Optional(Option<Box<CadenceValue>>),
    Array(Vec<CadenceValue>),
}

impl CadenceValue {
    /// `UFix64` from a decimal (rounded to eight places).
    pub fn ufix64(value: Decimal) -> Result<Self> {
        Ok(Self::UFix64(format_ufix64(value)?))
    }

    pub fn uint64(value: u64) -> Self {
        Self::UInt64(value.to_string())
    }

    /// `Address`, normalized to a `0x`-prefixed lowercase hex string.
    pub fn address(value: &str) -> Self {
        Self::Address(with_prefix(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Encode as the JSON-Cadence bytes placed in the transaction.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        // Serializing a closed enum of strings/bools cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Normalize an account address to `0x`-prefixed lowercase hex.
pub fn with_prefix(address: &str) -> String {
    format!("0x{}", sans_prefix(address))
}

/// Strip the `0x` prefix from an account address.
pub fn sans_prefix(address: &str) -> String {
    address
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .to_ascii_lowercase()
}

fn type_of(value: &Value) -> &str {
    value.get("type").and_then(Value::as_str).unwrap_or("<none>")
}

fn expect_type<'a>(value: &'a Value, expected: &str) -> Result<&'a Value> {
    let actual = type_of(value);
    if actual != expected {
        return Err(CoreError::CadenceType {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    value
        .get("value")
        .ok_or_else(|| CoreError::MissingField("value".to_string()))
}

/// Decode a `UFix64` result (e.g. a balance).
pub fn decode_ufix64(value: &Value) -> Result<Decimal> {
    let inner = expect_type(value, "UFix64")?;
    let text = inner.as_str().ok_or_else(|| CoreError::CadenceType {
        expected: "UFix64 string".to_string(),
        actual: inner.to_string(),
    })?;
    Ok(text.parse()?)
}

/// Decode a `UInt64` result.
pub fn decode_uint64(value: &Value) -> Result<u64> {
    let inner = expect_type(value, "UInt64")?;
    inner
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CoreError::CadenceType {
            expected: "UInt64 string".to_string(),
            actual: inner.to_string(),
        })
}

/// Decode an `[UInt64]` result (e.g. a list of position ids).
pub fn decode_uint64_array(value: &Value) -> Result<Vec<u64>> {
    let inner = expect_type(value, "Array")?;
    let items = inner.as_array().ok_or_else(|| CoreError::CadenceType {
        expected: "Array".to_string(),
        actual: inner.to_string(),
    })?;
    items.iter().map(decode_uint64).collect()
}

/// Look up a field of a composite value (Struct, Resource, Event).
pub fn composite_field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value
        .get("value")?
        .get("fields")?
        .as_array()?
        .iter()
        .find(|f| f.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|f| f.get("value"))
}

/// Convert a JSON-Cadence value into plain JSON for API responses and logs.
///
/// Numbers stay strings (Cadence fixed-point and 64-bit integers do not fit
/// JSON numbers), composites become objects keyed by field name.
pub fn to_plain(value: &Value) -> Value {
    let inner = value.get("value").cloned().unwrap_or(Value::Null);
    match type_of(value) {
        "Optional" => {
            if inner.is_null() {
                Value::Null
            } else {
                to_plain(&inner)
            }
        }
        "Array" => Value::Array(
            inner
                .as_array()
                .map(|items| items.iter().map(to_plain).collect())
                .unwrap_or_default(),
        ),
        "Dictionary" => {
            let mut out = Map::new();
            for entry in inner.as_array().into_iter().flatten() {
                let key = entry.get("key").map(to_plain).unwrap_or(Value::Null);
                let key = match key {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let val = entry.get("value").map(to_plain).unwrap_or(Value::Null);
                out.insert(key, val);
            }
            Value::Object(out)
        }
        "Struct" | "Resource" | "Event" | "Contract" | "Enum" => {
            let mut out = Map::new();
            for field in inner
                .get("fields")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if let Some(name) = field.get("name").and_then(Value::as_str) {
                    let val = field.get("value").map(to_plain).unwrap_or(Value::Null);
                    out.insert(name.to_string(), val);
                }
            }
            Value::Object(out)
        }
        _ => inner,
    }
}
