//! Tracing and logging setup for the relay server.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the server process.
///
/// # Configuration
///
/// Environment variables:
/// - `RUST_LOG`: log filter (default: `info,burrow_server=debug,burrow_relay=debug`)
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,burrow_server=debug,burrow_relay=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Telemetry initialized");

    Ok(())
}

/// Initialize telemetry for local development with pretty console output.
#[allow(dead_code)]
pub fn init_local() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,burrow_server=debug,burrow_relay=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Local telemetry initialized");

    Ok(())
}

/// Shutdown telemetry, flushing any pending output.
pub fn shutdown() {
    tracing::info!("Telemetry shutdown complete");
}
