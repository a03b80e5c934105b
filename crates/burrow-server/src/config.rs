//! Server configuration.

use std::net::SocketAddr;

use tracing::warn;

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP/WebSocket listener (default: 0.0.0.0:8080)
    pub bind: SocketAddr,
    /// Per-connection outbound queue depth (default: 256)
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".parse().expect("valid default bind address"),
            channel_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// - `BURROW_BIND`: listen address, e.g. `127.0.0.1:9000`
    /// - `BURROW_CHANNEL_CAPACITY`: outbound queue depth per connection
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bind) = std::env::var("BURROW_BIND") {
            match bind.parse() {
                Ok(addr) => config.bind = addr,
                Err(e) => warn!(value = %bind, error = %e, "Ignoring invalid BURROW_BIND"),
            }
        }

        if let Ok(capacity) = std::env::var("BURROW_CHANNEL_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(n) if n > 0 => config.channel_capacity = n,
                _ => warn!(value = %capacity, "Ignoring invalid BURROW_CHANNEL_CAPACITY"),
            }
        }

        config
    }
}
