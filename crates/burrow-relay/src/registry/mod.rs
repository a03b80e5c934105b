//! Registries tracking who is online and who belongs to what.
//!
//! The identity map and the room map are independently locked; no relay
//! operation requires atomicity across both.

mod connection_registry;
mod room_registry;

pub use connection_registry::{ConnectionEntry, ConnectionRegistry, OutboundFrame, SendResult};
pub use room_registry::{Room, RoomRegistry};
