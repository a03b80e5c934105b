//! Connection registry implementation.
//!
//! Tracks currently-connected identities for message routing.

use std::fmt;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// An encoded frame to be written to a connection.
///
/// This is the message type sent through the outbound channel; the owner of
/// the physical socket drains the channel and performs the actual writes.
/// Frames clone cheaply so one encoded payload can fan out to many
/// recipients.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// The encoded payload
    pub bytes: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

/// Connection state stored in the registry.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Channel to send frames to this connection
    pub sender: mpsc::Sender<OutboundFrame>,
}

impl ConnectionEntry {
    /// Create a new connection entry.
    pub fn new(sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self { sender }
    }
}

/// Result of attempting to send a frame to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Frame was successfully queued for delivery
    Sent,
    /// The recipient is not currently connected
    NotConnected,
    /// The channel to the recipient is full (backpressure)
    ChannelFull,
    /// The channel to the recipient is closed
    ChannelClosed,
}

/// Registry for tracking active connections.
///
/// Thread-safe registry mapping identities to connection entries. Uses
/// DashMap for concurrent access without explicit locking.
///
/// ## Usage
///
/// ```ignore
/// let registry = ConnectionRegistry::new();
///
/// // When a connection is established:
/// let (tx, rx) = mpsc::channel(256);
/// registry.register("alice".to_string(), tx);
///
/// // When routing a message:
/// let result = registry.send_to("alice", frame).await;
///
/// // When a connection closes:
/// registry.unregister("alice");
/// ```
pub struct ConnectionRegistry {
    /// Map of identity to connection entry
    connections: DashMap<String, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create a new connection registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection with its outbound channel.
    ///
    /// If a connection with the same identity already exists, it is
    /// replaced and the prior physical connection becomes orphaned: writes
    /// to it still drain until its channel errors, but the registry no
    /// longer routes to it. This handles reconnection scenarios where a
    /// client reconnects before the old connection is cleaned up.
    #[instrument(skip(self, sender), fields(identity = %identity))]
    pub fn register(&self, identity: String, sender: mpsc::Sender<OutboundFrame>) {
        let existing = self.connections.insert(identity, ConnectionEntry::new(sender));
        if existing.is_some() {
            debug!("Replaced existing connection registration");
        } else {
            debug!("Registered new connection");
        }
    }

    /// Unregister a connection.
    ///
    /// Returns the entry if the identity was registered, None otherwise.
    /// A no-op on absent identities, so cleanup racing a replacement
    /// registration stays idempotent.
    #[instrument(skip(self), fields(identity = %identity))]
    pub fn unregister(&self, identity: &str) -> Option<ConnectionEntry> {
        let removed = self.connections.remove(identity);
        if removed.is_some() {
            debug!("Unregistered connection");
        } else {
            debug!("Connection was not registered");
        }
        removed.map(|(_, entry)| entry)
    }

    /// Look up the current outbound channel for an identity.
    pub fn lookup(&self, identity: &str) -> Option<mpsc::Sender<OutboundFrame>> {
        self.connections
            .get(identity)
            .map(|entry| entry.value().sender.clone())
    }

    /// Check if an identity is currently connected.
    pub fn is_connected(&self, identity: &str) -> bool {
        self.connections.contains_key(identity)
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send a frame to a connected identity.
    ///
    /// Returns the result of the send operation.
    #[instrument(skip(self, frame), fields(to = %identity))]
    pub async fn send_to(&self, identity: &str, frame: OutboundFrame) -> SendResult {
        let sender = match self.connections.get(identity) {
            Some(entry) => entry.value().sender.clone(),
            None => {
                debug!("Recipient not connected");
                return SendResult::NotConnected;
            }
        };

        match sender.try_send(frame) {
            Ok(()) => {
                debug!("Frame queued for delivery");
                SendResult::Sent
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound channel full, applying backpressure");
                SendResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, connection may have dropped");
                // Remove the stale entry
                self.connections.remove(identity);
                SendResult::ChannelClosed
            }
        }
    }

    /// Send the same frame to multiple recipients.
    ///
    /// Every delivery is attempted; one recipient's failure never
    /// short-circuits the rest. Returns an (identity, result) pair per
    /// recipient.
    pub async fn send_to_many<'a, I>(
        &self,
        recipients: I,
        frame: OutboundFrame,
    ) -> Vec<(String, SendResult)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut results = Vec::new();

        for identity in recipients {
            let result = self.send_to(identity, frame.clone()).await;
            results.push((identity.to_string(), result));
        }

        results
    }

    /// List all connected identities.
    ///
    /// Useful for debugging and monitoring.
    pub fn list_connections(&self) -> Vec<String> {
        self.connections.iter().map(|r| r.key().clone()).collect()
    }

    /// Remove all stale connections (those with closed channels).
    ///
    /// This can be called periodically to clean up connections that
    /// were not properly unregistered.
    pub fn cleanup_stale(&self) -> usize {
        let mut removed = 0;
        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| entry.value().sender.is_closed())
            .map(|entry| entry.key().clone())
            .collect();

        for identity in stale {
            if self.connections.remove(&identity).is_some() {
                debug!(identity = %identity, "Removed stale connection");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(count = removed, "Cleaned up stale connections");
        }

        removed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}
