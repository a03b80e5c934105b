//! HTTP server wiring: router, shared state, and graceful shutdown.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use burrow_relay::{ConnectionRegistry, Dispatcher, RoomRegistry};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::config::ServerConfig;

mod routes;

/// Server application state shared by all routes.
pub struct AppState {
    /// Registry of live connections
    pub connections: Arc<ConnectionRegistry>,
    /// Registry of rooms and membership
    pub rooms: Arc<RoomRegistry>,
    /// Routing logic over both registries
    pub dispatcher: Arc<Dispatcher>,
    /// Root token cancelled on shutdown; sessions run on child tokens
    pub shutdown: CancellationToken,
    /// Per-connection outbound queue depth
    pub channel_capacity: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig, shutdown: CancellationToken) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(connections.clone(), rooms.clone()));
        Self {
            connections,
            rooms,
            dispatcher,
            shutdown,
            channel_capacity: config.channel_capacity,
        }
    }
}

/// Start the HTTP server and serve until shutdown.
pub async fn start(config: ServerConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(&config, shutdown.clone()));

    let app = create_router(state);

    info!(addr = %config.bind, "Starting relay server");
    let listener = tokio::net::TcpListener::bind(config.bind).await?;

    // Ctrl-c cancels the root token, which both stops the listener and
    // unblocks every session loop's pending read.
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

/// Create the Axum router with all routes and middleware.
fn create_router(state: Arc<AppState>) -> Router {
    // The websocket router applies its own state before merging, which
    // converts it to Router<()>.
    let ws_router = routes::websocket::router(state.clone());

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
        .merge(ws_router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
}

/// Health check endpoint with live registry counts.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "burrow-server",
            "version": env!("CARGO_PKG_VERSION"),
            "connections": state.connections.connection_count(),
            "rooms": state.rooms.room_count(),
        })),
    )
}
