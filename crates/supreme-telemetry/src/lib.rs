//! Prometheus metrics and structured logging for the supreme keeper.
//!
//! - Prometheus metrics for the key pool, submissions, oracle pushes,
//!   feed health, settlement and house funding
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
