//! Grid payout multiplier.
//!
//! Must match the client's grid formula exactly; the client renders the
//! same numbers before the bet is signed.

const BASE: f64 = 1.4;
const ROW_FACTOR: f64 = 0.55;
const TIME_POW: f64 = 0.3;
const COL_DECAY: f64 = 0.08;
const CAP: f64 = 100.0;

/// Seconds per grid column.
pub const COLUMN_SECS: f64 = 5.0;
/// Approximate ledger block time.
pub const BLOCK_SECS: f64 = 1.2;

/// Payout multiplier for a cell `row_dist` rows from the price and
/// `col_dist` columns into the future. Clamped to `[1, 100]`.
pub fn multiplier(row_dist: f64, col_dist: f64) -> f64 {
    if col_dist <= 0.0 {
        return 1.0;
    }
    let row_component = (row_dist * ROW_FACTOR).exp();
    let time_component = col_dist.powf(TIME_POW) / (row_dist * COL_DECAY).exp();
    (BASE * row_component * time_component).clamp(1.0, CAP)
}

/// Round to two decimals for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Bet duration in seconds.
pub fn duration_secs(col_dist: f64) -> f64 {
    (col_dist * COLUMN_SECS).max(0.0)
}

/// Bet duration in ledger blocks, rounded up.
pub fn duration_blocks(col_dist: f64) -> u64 {
    (duration_secs(col_dist) / BLOCK_SECS).ceil() as u64
}
