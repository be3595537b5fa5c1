//! Supreme keeper service.
//!
//! Orchestrates every component on one runtime:
//! - trade feed → price ingestor → oracle pusher, with a watchdog
//! - settlement sweeper and house balance guard
//! - HTTP API
//!
//! All state-changing transactions share one `Submitter` and its key pool.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
