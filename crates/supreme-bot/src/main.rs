//! Supreme keeper - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Supreme keeper: oracle pusher, settlement bot, house funder and API.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SUPREME_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before the first wss:// connection
    supreme_feed::init_crypto();

    let args = Args::parse();

    // CLI arg > SUPREME_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SUPREME_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = supreme_bot::AppConfig::from_file(&config_path)?;
    supreme_telemetry::init_logging(&config.telemetry.log_level)?;
    supreme_bot::app::install_panic_hook();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %config_path,
        "Starting supreme keeper"
    );

    let app = supreme_bot::Application::new(config)?;

    let shutdown = app.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            shutdown.cancel();
        }
    });

    app.run().await?;
    Ok(())
}
