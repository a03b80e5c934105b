//! # burrow-relay
//!
//! Core library for the Burrow message relay: the connection registry,
//! room membership model, and message-dispatch protocol.
//!
//! This crate is transport-agnostic. A connection is represented by the
//! sending half of a bounded [`tokio::sync::mpsc`] channel; the host
//! application (see `burrow-server`) owns the physical socket and drains
//! the channel into it with a per-connection writer task.
//!
//! ## Architecture
//!
//! - **Registry**: [`registry::ConnectionRegistry`] maps identities to live
//!   connections, [`registry::RoomRegistry`] maps room names to member sets
//! - **Dispatcher**: [`dispatch::Dispatcher`] makes one routing decision per
//!   inbound message (direct forward, room management, room broadcast)
//! - **Session Loop**: [`session::SessionLoop`] drives decode and dispatch
//!   for one connection until disconnect or shutdown
//!
//! ## Delivery semantics
//!
//! Delivery is best-effort: content messages to unreachable recipients are
//! dropped silently, room management commands are acknowledged or rejected
//! with an `error` record to the sender only, and nothing is queued for
//! offline users.

pub mod dispatch;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod session;

mod error;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::RelayError;
pub use protocol::{kinds, Envelope, MessageKind, SERVER_SENDER};
pub use registry::{
    ConnectionEntry, ConnectionRegistry, OutboundFrame, Room, RoomRegistry, SendResult,
};
pub use session::{ConnectionState, SessionLoop};
