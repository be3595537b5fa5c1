//! Precision-safe price type.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. Prices leave the process
//! as Cadence `UFix64` values, which carry exactly eight fractional digits.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits in a Cadence `UFix64`.
pub const UFIX64_SCALE: u32 = 8;

/// Price with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Format as a Cadence `UFix64` literal (eight fractional digits).
    pub fn to_ufix64(&self) -> Result<String> {
        format_ufix64(self.0)
    }
}

/// Format any non-negative decimal as a Cadence `UFix64` literal.
///
/// Values are rounded half-even to eight places and zero-padded, so
/// `67000.5` becomes `"67000.50000000"`.
pub fn format_ufix64(value: Decimal) -> Result<String> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(CoreError::InvalidPrice(format!(
            "UFix64 cannot be negative: {value}"
        )));
    }
    let mut scaled = value.round_dp(UFIX64_SCALE);
    scaled.rescale(UFIX64_SCALE);
    Ok(scaled.to_string())
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}
