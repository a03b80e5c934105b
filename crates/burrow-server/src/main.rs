use anyhow::Result;
use tracing::info;

mod config;
mod server;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init().map_err(|e| anyhow::anyhow!(e))?;

    info!("Burrow relay starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("License: AGPL-3.0");

    let config = config::ServerConfig::from_env();
    server::start(config).await?;

    telemetry::shutdown();
    Ok(())
}
