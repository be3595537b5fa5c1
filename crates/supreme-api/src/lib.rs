//! HTTP surface of the supreme keeper.
//!
//! ```text
//! GET  /api/health               oracle health, admin address, pool size
//! GET  /api/price                latest price and staleness
//! GET  /api/house-balance        house pool balance
//! GET  /api/positions/{address}  a user's positions
//! POST /api/sign-bet             multiplier, duration and expiry for a bet
//! POST /api/sign                 admin co-signature for a user transaction
//! POST /api/fund-account         one-time FLOW grant for new users
//! GET  /metrics                  prometheus text
//! ```

mod config;
mod error;
pub mod multiplier;
mod server;
mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use server::{create_router, run_server, SignBetRequest, SignBetResponse};
pub use state::ApiState;
