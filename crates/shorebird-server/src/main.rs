use anyhow::Result;
use tracing::info;

mod config;
mod db;
mod server;
mod stores;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init().map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    info!("Shorebird Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("License: AGPL-3.0");

    let config = config::ServerConfig::from_env()?;
    server::start(config).await?;

    Ok(())
}
