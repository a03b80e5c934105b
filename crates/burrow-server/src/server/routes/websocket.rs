//! WebSocket transport for the relay.
//!
//! Upgrades `GET /ws?user=<identity>` into a relay connection. The identity
//! is supplied out-of-band as a query parameter and validated before the
//! upgrade; a connection without one is rejected and never registered.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use burrow_relay::{RelayError, SessionLoop};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::AppState;

/// Query parameters of the websocket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// The identity to register the connection under
    user: Option<String>,
}

/// Create the WebSocket router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

/// GET /ws?user=<identity>
///
/// Rejects a missing or empty identity with 400 before the upgrade; the
/// session is only registered once the socket is established.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match identity_from_query(&params) {
        Some(identity) => identity,
        None => {
            warn!("Rejecting connection attempt without a user identity");
            return (StatusCode::BAD_REQUEST, "user query parameter is required").into_response();
        }
    };

    info!(identity = %identity, "WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

/// Extract a usable identity from the query, if any.
fn identity_from_query(params: &WsParams) -> Option<String> {
    let identity = params.user.as_deref()?.trim();
    if identity.is_empty() {
        None
    } else {
        Some(identity.to_string())
    }
}

/// Drive one upgraded connection: register, relay, clean up.
async fn handle_socket(socket: WebSocket, identity: String, state: Arc<AppState>) {
    let (mut sink, receiver) = socket.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.channel_capacity);

    let session = match SessionLoop::connect(
        identity.clone(),
        outbound_tx,
        state.dispatcher.clone(),
        state.connections.clone(),
        state.shutdown.child_token(),
    ) {
        Ok(session) => session,
        Err(e) => {
            warn!(identity = %identity, error = %e, "Rejecting connection");
            let _ = sink.close().await;
            return;
        }
    };

    info!(identity = %identity, "User connected");

    // Writer task: drain the outbound queue into the socket. Writes from
    // concurrent dispatches serialize through the channel, so the sink has
    // a single writer.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match String::from_utf8(frame.bytes.to_vec()) {
                Ok(text) => Message::Text(text),
                Err(_) => Message::Binary(frame.bytes.to_vec()),
            };
            if let Err(e) = sink.send(message).await {
                debug!(error = %e, "Outbound write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Data frames feed the session loop; control frames stay with the
    // protocol layer.
    let inbound = receiver
        .filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(Bytes::from(text))),
                Ok(Message::Binary(data)) => Some(Ok(Bytes::from(data))),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Close(_)) => None,
                Err(e) => Some(Err(RelayError::transport(e.to_string()))),
            }
        })
        .boxed();

    session.run(inbound).await;

    // run() has unregistered the identity, which drops the registry's
    // sender; the writer ends once the remaining queue drains, closing
    // the socket last.
    let _ = writer.await;

    info!(identity = %identity, "User disconnected");
}
