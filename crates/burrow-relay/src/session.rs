//! Per-connection session loop.
//!
//! One [`SessionLoop`] runs per live connection, driving decode and
//! dispatch until the peer disconnects or the server shuts down. It is the
//! only component whose lifetime is tied to a physical connection; the
//! registries and dispatcher are long-lived shared services.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::dispatch::Dispatcher;
use crate::metrics;
use crate::protocol::Envelope;
use crate::registry::{ConnectionRegistry, OutboundFrame};
use crate::RelayError;

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Identity supplied but not yet validated or registered
    Connecting,
    /// Registered; frames are being decoded and dispatched
    Active,
    /// Terminal; the identity has been unregistered
    Closed,
}

/// Control loop for one connection.
///
/// Construction via [`SessionLoop::connect`] registers the identity; the
/// loop itself consumes a stream of raw inbound frames. The transport is
/// closed by the caller after [`SessionLoop::run`] returns, so the handle
/// is released from the registry before the socket goes away.
#[derive(Debug)]
pub struct SessionLoop {
    identity: String,
    dispatcher: Arc<Dispatcher>,
    connections: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
    state: ConnectionState,
}

impl SessionLoop {
    /// Validate an identity and register its outbound channel.
    ///
    /// Fails with [`RelayError::EmptyIdentity`] before anything is
    /// registered; an empty identity never reaches the Active state. A
    /// duplicate identity silently replaces the prior registration
    /// (replace-on-collision, see the connection registry).
    pub fn connect(
        identity: impl Into<String>,
        outbound: mpsc::Sender<OutboundFrame>,
        dispatcher: Arc<Dispatcher>,
        connections: Arc<ConnectionRegistry>,
        shutdown: CancellationToken,
    ) -> Result<Self, RelayError> {
        let mut session = Self {
            identity: identity.into(),
            dispatcher,
            connections,
            shutdown,
            state: ConnectionState::Connecting,
        };

        if session.identity.is_empty() {
            return Err(RelayError::EmptyIdentity);
        }

        session
            .connections
            .register(session.identity.clone(), outbound);
        session.state = ConnectionState::Active;
        metrics::record_connection_count(session.connections.connection_count() as i64);
        info!(identity = %session.identity, "Session registered");

        Ok(session)
    }

    /// The identity this session registered as.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drive the session until disconnect, transport error, or shutdown.
    ///
    /// Frames that fail to decode are skipped; the connection survives
    /// malformed input. A transport-level read error or end of stream
    /// terminates the loop. Cancellation follows the same cleanup path as
    /// a natural disconnect.
    #[instrument(name = "session.run", skip(self, inbound), fields(identity = %self.identity))]
    pub async fn run<I>(mut self, mut inbound: I)
    where
        I: Stream<Item = Result<Bytes, RelayError>> + Unpin,
    {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Session cancelled by shutdown");
                    break;
                }
                frame = inbound.next() => frame,
            };

            let raw = match frame {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    info!(error = %e, "Transport read failed");
                    break;
                }
                None => {
                    info!("Peer closed the stream");
                    break;
                }
            };

            let envelope = match Envelope::decode(&raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable frame");
                    metrics::record_rejected_frame();
                    continue;
                }
            };

            match self.dispatcher.dispatch(&self.identity, &envelope, &raw).await {
                Ok(outcome) => debug!(?outcome, "Dispatched"),
                Err(e) => warn!(error = %e, "Dispatch failed"),
            }
        }

        self.close();
    }

    /// Transition to Closed and unregister, exactly once.
    fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        self.connections.unregister(&self.identity);
        metrics::record_connection_count(self.connections.connection_count() as i64);
        info!(identity = %self.identity, "Session closed");
    }
}
