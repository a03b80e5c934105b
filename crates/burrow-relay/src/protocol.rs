//! Wire protocol for the relay.
//!
//! Every frame on the wire is one JSON-encoded [`Envelope`]. The `type`
//! field selects routing behavior; an absent or unrecognized `type` is
//! treated as a direct message so that older clients keep working.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::RelayError;

/// Sender identity used on server-originated acknowledgment records.
pub const SERVER_SENDER: &str = "server";

/// Recognized values of the envelope `type` field.
pub mod kinds {
    /// Client request: create a room (room name in `content`, fallback `room`)
    pub const CREATE_ROOM: &str = "create_room";
    /// Client request: invite `recipient` into `room`
    pub const INVITE: &str = "invite";
    /// Client request or server broadcast: message to all members of `room`
    pub const ROOM_MSG: &str = "room_msg";
    /// Server ack: room was created
    pub const ROOM_CREATED: &str = "room_created";
    /// Server ack: invite was recorded
    pub const INVITE_SENT: &str = "invite_sent";
    /// Server notification: you were invited to a room
    pub const INVITED: &str = "invited";
    /// Server rejection of a management command
    pub const ERROR: &str = "error";
}

/// Routing behavior selected by an envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Forward to a single recipient (the default for unknown types)
    Direct,
    /// Create a room with the sender as sole member
    CreateRoom,
    /// Extend a room's membership
    Invite,
    /// Broadcast to all room members except the sender
    RoomMsg,
}

/// A chat message or command exchanged between clients and the server.
///
/// All fields default to empty on decode so partial envelopes (such as the
/// original direct-message shape without a `type`) remain valid. Unknown
/// extra fields are tolerated by the decoder; direct messages are forwarded
/// as the original bytes so those fields survive relaying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type; empty means direct message
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Identity the client claims to send as
    #[serde(default)]
    pub sender: String,
    /// Target identity for direct messages and invites
    #[serde(default)]
    pub recipient: String,
    /// Message body, or the room name for `create_room`
    #[serde(default)]
    pub content: String,
    /// Room name for room-scoped commands
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room: String,
}

impl Envelope {
    /// Decode one wire frame into an envelope.
    pub fn decode(raw: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(raw).map_err(RelayError::Decode)
    }

    /// Encode this envelope for the wire.
    pub fn encode(&self) -> Result<Bytes, RelayError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(RelayError::Encode)
    }

    /// Classify the envelope for routing.
    pub fn message_kind(&self) -> MessageKind {
        match self.kind.as_str() {
            kinds::CREATE_ROOM => MessageKind::CreateRoom,
            kinds::INVITE => MessageKind::Invite,
            kinds::ROOM_MSG => MessageKind::RoomMsg,
            _ => MessageKind::Direct,
        }
    }

    /// Server ack sent to a creator after a successful `create_room`.
    pub fn room_created(room: &str) -> Self {
        Self {
            kind: kinds::ROOM_CREATED.to_string(),
            sender: SERVER_SENDER.to_string(),
            room: room.to_string(),
            content: format!("room {:?} created successfully", room),
            ..Self::default()
        }
    }

    /// Server ack sent to an inviter after a successful `invite`.
    pub fn invite_sent(invitee: &str, room: &str) -> Self {
        Self {
            kind: kinds::INVITE_SENT.to_string(),
            sender: SERVER_SENDER.to_string(),
            room: room.to_string(),
            content: format!("user {:?} invited to room {:?}", invitee, room),
            ..Self::default()
        }
    }

    /// Best-effort notification delivered to an online invitee.
    ///
    /// Unlike acks this carries the inviter's identity as `sender` so the
    /// invitee knows who extended the invitation.
    pub fn invited(inviter: &str, room: &str) -> Self {
        Self {
            kind: kinds::INVITED.to_string(),
            sender: inviter.to_string(),
            room: room.to_string(),
            content: format!("you have been invited to room {:?} by {}", room, inviter),
            ..Self::default()
        }
    }

    /// Server rejection of a management command.
    pub fn server_error(reason: impl Into<String>) -> Self {
        Self {
            kind: kinds::ERROR.to_string(),
            sender: SERVER_SENDER.to_string(),
            content: reason.into(),
            ..Self::default()
        }
    }

    /// Room broadcast fanned out to members, re-encoded once by the
    /// dispatcher with the original sender's identity.
    pub fn room_message(sender: &str, room: &str, content: &str) -> Self {
        Self {
            kind: kinds::ROOM_MSG.to_string(),
            sender: sender.to_string(),
            room: room.to_string(),
            content: content.to_string(),
            ..Self::default()
        }
    }
}
