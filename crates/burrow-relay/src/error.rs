//! Error types for the relay core.

use thiserror::Error;

/// Relay errors.
///
/// The room and invite variants render to the exact text sent back to
/// clients in `error` records, so their messages are part of the wire
/// contract.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Room creation collided with an existing room name
    #[error("room {name:?} already exists")]
    RoomExists {
        /// The contested room name
        name: String,
    },

    /// Operation referenced a room that was never created
    #[error("room {name:?} does not exist")]
    RoomNotFound {
        /// The unknown room name
        name: String,
    },

    /// Only members may extend or inspect a room's membership
    #[error("you are not a member of room {room:?}")]
    NotAMember {
        /// The room the requester is not part of
        room: String,
    },

    /// A connection attempt supplied an empty identity
    #[error("identity must not be empty")]
    EmptyIdentity,

    /// An inbound command was missing required fields
    #[error("{0}")]
    InvalidRequest(String),

    /// An inbound frame was not a valid message envelope
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// An outbound message could not be encoded
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Transport-level read or write failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl RelayError {
    /// Create a new room-exists error.
    pub fn room_exists(name: impl Into<String>) -> Self {
        Self::RoomExists { name: name.into() }
    }

    /// Create a new room-not-found error.
    pub fn room_not_found(name: impl Into<String>) -> Self {
        Self::RoomNotFound { name: name.into() }
    }

    /// Create a new not-a-member error.
    pub fn not_a_member(room: impl Into<String>) -> Self {
        Self::NotAMember { room: room.into() }
    }

    /// Create a new invalid-request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
