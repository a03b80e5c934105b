//! Message dispatch.
//!
//! The [`Dispatcher`] is stateless routing logic: one routing decision per
//! inbound message, expressed over the sender's identity, the decoded
//! envelope, and the two registries.
//!
//! # Routing rules
//!
//! | kind | rule | on failure |
//! |---|---|---|
//! | direct (default) | forward original bytes to `recipient` | silent drop |
//! | `create_room` | create room, ack `room_created` | `error` record to sender |
//! | `invite` | add member, ack `invite_sent`, notify invitee | `error` record to sender |
//! | `room_msg` | re-encode once, fan out to members except sender | silent drop |
//!
//! The asymmetry is intentional: management commands need confirmation,
//! content delivery is fire-and-forget.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::metrics;
use crate::protocol::{Envelope, MessageKind};
use crate::registry::{ConnectionRegistry, OutboundFrame, RoomRegistry, SendResult};
use crate::RelayError;

/// Result of one routing decision.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Direct message forwarded (or dropped, per the inner result)
    Direct(SendResult),
    /// Room created and acknowledged to the creator
    RoomCreated {
        /// The new room's name
        room: String,
    },
    /// Invite recorded and acknowledged to the inviter
    InviteSent {
        /// The room the invitee was added to
        room: String,
        /// The invited identity
        invitee: String,
        /// Whether the invitee was online and got an `invited` record
        notified: bool,
    },
    /// Room message fanned out to members
    RoomBroadcast {
        /// Members whose connection accepted the frame
        delivered: usize,
        /// Members with no current connection
        offline: usize,
        /// Members whose connection refused the write
        failed: usize,
    },
    /// Management command rejected; an `error` record went to the sender
    Rejected {
        /// Failure reason, as sent to the client
        reason: String,
    },
    /// Message silently dropped (content delivery, best-effort policy)
    Dropped {
        /// Why the message went nowhere (log only)
        reason: String,
    },
}

impl DispatchOutcome {
    /// Short label for metrics.
    fn label(&self) -> &'static str {
        match self {
            Self::Direct(SendResult::Sent) => "delivered",
            Self::Direct(_) => "dropped",
            Self::RoomCreated { .. } => "room_created",
            Self::InviteSent { .. } => "invite_sent",
            Self::RoomBroadcast { .. } => "broadcast",
            Self::Rejected { .. } => "rejected",
            Self::Dropped { .. } => "dropped",
        }
    }
}

/// Stateless router from inbound messages to outbound writes.
///
/// Holds shared references to the registries but no per-message state;
/// concurrent dispatch from many session loops is safe.
pub struct Dispatcher {
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
}

impl Dispatcher {
    /// Create a new dispatcher over the given registries.
    pub fn new(connections: Arc<ConnectionRegistry>, rooms: Arc<RoomRegistry>) -> Self {
        Self { connections, rooms }
    }

    /// Route one inbound message.
    ///
    /// `raw` must be the undecoded frame the envelope came from; direct
    /// messages forward it verbatim so unknown fields the sender included
    /// survive relaying. Never mutates the inbound envelope; server
    /// records are constructed fresh.
    #[instrument(skip(self, envelope, raw), fields(sender = %sender, kind = %envelope.kind))]
    pub async fn dispatch(
        &self,
        sender: &str,
        envelope: &Envelope,
        raw: &Bytes,
    ) -> Result<DispatchOutcome, RelayError> {
        let outcome = match envelope.message_kind() {
            MessageKind::Direct => self.handle_direct(sender, envelope, raw).await,
            MessageKind::CreateRoom => self.handle_create_room(sender, envelope).await?,
            MessageKind::Invite => self.handle_invite(sender, envelope).await?,
            MessageKind::RoomMsg => self.handle_room_msg(sender, envelope).await?,
        };

        let kind = if envelope.kind.is_empty() {
            "direct"
        } else {
            envelope.kind.as_str()
        };
        metrics::record_dispatch(kind, outcome.label());

        Ok(outcome)
    }

    /// Forward a direct message to a single recipient.
    ///
    /// The original bytes go out unchanged. An absent recipient is a
    /// silent drop; no error record is surfaced to the sender.
    async fn handle_direct(&self, sender: &str, envelope: &Envelope, raw: &Bytes) -> DispatchOutcome {
        debug!(recipient = %envelope.recipient, "Direct message");

        let result = self
            .connections
            .send_to(&envelope.recipient, OutboundFrame::new(raw.clone()))
            .await;

        if result != SendResult::Sent {
            debug!(
                recipient = %envelope.recipient,
                sender = %sender,
                ?result,
                "Direct message not delivered"
            );
        }

        DispatchOutcome::Direct(result)
    }

    /// Create a room with the sender as first member.
    async fn handle_create_room(
        &self,
        sender: &str,
        envelope: &Envelope,
    ) -> Result<DispatchOutcome, RelayError> {
        // Room name comes from content, falling back to the room field.
        let name = if envelope.content.is_empty() {
            envelope.room.as_str()
        } else {
            envelope.content.as_str()
        };
        if name.is_empty() {
            return self.reject(sender, "room name is required").await;
        }

        if let Err(e) = self.rooms.create_room(name, sender) {
            return self.reject(sender, e.to_string()).await;
        }
        metrics::record_room_count(self.rooms.room_count() as i64);

        self.send_record(sender, &Envelope::room_created(name)).await?;
        Ok(DispatchOutcome::RoomCreated {
            room: name.to_string(),
        })
    }

    /// Add a user to a room and notify both parties.
    async fn handle_invite(
        &self,
        sender: &str,
        envelope: &Envelope,
    ) -> Result<DispatchOutcome, RelayError> {
        let room = envelope.room.as_str();
        let invitee = envelope.recipient.as_str();
        if room.is_empty() || invitee.is_empty() {
            return self
                .reject(sender, "room and recipient are required for invite")
                .await;
        }

        if let Err(e) = self.rooms.add_member(room, sender, invitee) {
            return self.reject(sender, e.to_string()).await;
        }

        self.send_record(sender, &Envelope::invite_sent(invitee, room))
            .await?;

        // Notify the invitee if they are online. Best effort: an offline
        // invitee simply never learns of the invite until they ask.
        let notified = if self.connections.is_connected(invitee) {
            let result = self
                .send_record(invitee, &Envelope::invited(sender, room))
                .await?;
            result == SendResult::Sent
        } else {
            false
        };

        Ok(DispatchOutcome::InviteSent {
            room: room.to_string(),
            invitee: invitee.to_string(),
            notified,
        })
    }

    /// Broadcast a message to all online members of a room except the
    /// sender.
    ///
    /// The outgoing record is encoded once and the same bytes fan out to
    /// every recipient. Excluding the sender is a membership filter, not a
    /// routing error. Authorization failures are silent, mirroring the
    /// direct-message policy.
    async fn handle_room_msg(
        &self,
        sender: &str,
        envelope: &Envelope,
    ) -> Result<DispatchOutcome, RelayError> {
        let room = envelope.room.as_str();
        if room.is_empty() {
            warn!("Room message missing room name");
            return Ok(DispatchOutcome::Dropped {
                reason: "room name is required".to_string(),
            });
        }

        let members = match self.rooms.members(room, sender) {
            Some(members) => members,
            None => {
                warn!(room = %room, "Sender cannot post to room (not a member or no such room)");
                return Ok(DispatchOutcome::Dropped {
                    reason: format!("room {:?} not visible to sender", room),
                });
            }
        };

        debug!(room = %room, members = members.len(), "Room broadcast");

        let frame = OutboundFrame::new(
            Envelope::room_message(sender, room, &envelope.content).encode()?,
        );

        let mut delivered = 0;
        let mut offline = 0;
        let mut failed = 0;
        for member in &members {
            // Skip the sender; they already know what they sent.
            if member == sender {
                continue;
            }
            match self.connections.send_to(member, frame.clone()).await {
                SendResult::Sent => delivered += 1,
                SendResult::NotConnected => offline += 1,
                result => {
                    warn!(member = %member, ?result, "Room broadcast write failed");
                    failed += 1;
                }
            }
        }

        Ok(DispatchOutcome::RoomBroadcast {
            delivered,
            offline,
            failed,
        })
    }

    /// Send an `error` record to the sender and report the rejection.
    async fn reject(
        &self,
        sender: &str,
        reason: impl Into<String>,
    ) -> Result<DispatchOutcome, RelayError> {
        let reason = reason.into();
        debug!(reason = %reason, "Rejecting management command");
        self.send_record(sender, &Envelope::server_error(reason.clone()))
            .await?;
        Ok(DispatchOutcome::Rejected { reason })
    }

    /// Encode a server record and queue it for one identity.
    ///
    /// Delivery of acks is itself best-effort; a sender that disconnected
    /// mid-dispatch just misses the confirmation.
    async fn send_record(&self, identity: &str, record: &Envelope) -> Result<SendResult, RelayError> {
        let frame = OutboundFrame::new(record.encode()?);
        let result = self.connections.send_to(identity, frame).await;
        if result != SendResult::Sent {
            debug!(identity = %identity, kind = %record.kind, ?result, "Server record not delivered");
        }
        Ok(result)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("connections", &self.connections)
            .field("rooms", &self.rooms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::kinds;
    use tokio::sync::mpsc;

    struct Harness {
        dispatcher: Dispatcher,
        connections: Arc<ConnectionRegistry>,
        rooms: Arc<RoomRegistry>,
    }

    impl Harness {
        fn new() -> Self {
            let connections = Arc::new(ConnectionRegistry::new());
            let rooms = Arc::new(RoomRegistry::new());
            let dispatcher = Dispatcher::new(connections.clone(), rooms.clone());
            Self {
                dispatcher,
                connections,
                rooms,
            }
        }

        fn connect(&self, identity: &str) -> mpsc::Receiver<OutboundFrame> {
            let (tx, rx) = mpsc::channel(16);
            self.connections.register(identity.to_string(), tx);
            rx
        }

        async fn dispatch_raw(&self, sender: &str, raw: &[u8]) -> DispatchOutcome {
            let raw = Bytes::copy_from_slice(raw);
            let envelope = Envelope::decode(&raw).unwrap();
            self.dispatcher
                .dispatch(sender, &envelope, &raw)
                .await
                .unwrap()
        }
    }

    fn recv_record(rx: &mut mpsc::Receiver<OutboundFrame>) -> Envelope {
        let frame = rx.try_recv().expect("expected a queued frame");
        Envelope::decode(&frame.bytes).unwrap()
    }

    #[tokio::test]
    async fn test_direct_message_forwards_original_bytes() {
        let h = Harness::new();
        let mut bob = h.connect("bob");

        // Extra fields must survive because the raw bytes are forwarded.
        let raw = br#"{"sender":"alice","recipient":"bob","content":"hi","ts":42}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(outcome, DispatchOutcome::Direct(SendResult::Sent)));
        let frame = bob.try_recv().unwrap();
        assert_eq!(&frame.bytes[..], &raw[..]);
    }

    #[tokio::test]
    async fn test_direct_message_to_offline_recipient_drops_silently() {
        let h = Harness::new();
        let mut alice = h.connect("alice");

        let raw = br#"{"sender":"alice","recipient":"bob","content":"hi"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::Direct(SendResult::NotConnected)
        ));
        // No error record comes back to the sender.
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_room_acks_creator() {
        let h = Harness::new();
        let mut alice = h.connect("alice");

        let raw = br#"{"type":"create_room","sender":"alice","content":"general"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(outcome, DispatchOutcome::RoomCreated { ref room } if room == "general"));
        assert_eq!(
            h.rooms.members("general", "alice").unwrap(),
            vec!["alice".to_string()]
        );

        let ack = recv_record(&mut alice);
        assert_eq!(ack.kind, kinds::ROOM_CREATED);
        assert_eq!(ack.sender, crate::SERVER_SENDER);
        assert_eq!(ack.room, "general");
    }

    #[tokio::test]
    async fn test_create_room_name_falls_back_to_room_field() {
        let h = Harness::new();
        let _alice = h.connect("alice");

        let raw = br#"{"type":"create_room","sender":"alice","room":"general"}"#;
        h.dispatch_raw("alice", raw).await;

        assert!(h.rooms.room_exists("general"));
    }

    #[tokio::test]
    async fn test_create_room_empty_name_rejected() {
        let h = Harness::new();
        let mut alice = h.connect("alice");

        let raw = br#"{"type":"create_room","sender":"alice"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
        let err = recv_record(&mut alice);
        assert_eq!(err.kind, kinds::ERROR);
        assert_eq!(err.content, "room name is required");
    }

    #[tokio::test]
    async fn test_create_room_duplicate_rejected() {
        let h = Harness::new();
        let mut alice = h.connect("alice");

        let raw = br#"{"type":"create_room","sender":"alice","content":"general"}"#;
        h.dispatch_raw("alice", raw).await;
        let _ack = recv_record(&mut alice);

        let outcome = h.dispatch_raw("alice", raw).await;
        assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));

        let err = recv_record(&mut alice);
        assert_eq!(err.kind, kinds::ERROR);
        assert_eq!(err.content, "room \"general\" already exists");
    }

    #[tokio::test]
    async fn test_invite_acks_inviter_and_notifies_online_invitee() {
        let h = Harness::new();
        let mut alice = h.connect("alice");
        let mut bob = h.connect("bob");
        h.rooms.create_room("general", "alice").unwrap();

        let raw = br#"{"type":"invite","sender":"alice","recipient":"bob","room":"general"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(
            matches!(outcome, DispatchOutcome::InviteSent { notified: true, ref invitee, .. } if invitee == "bob")
        );

        let ack = recv_record(&mut alice);
        assert_eq!(ack.kind, kinds::INVITE_SENT);
        assert_eq!(ack.sender, crate::SERVER_SENDER);

        let notify = recv_record(&mut bob);
        assert_eq!(notify.kind, kinds::INVITED);
        assert_eq!(notify.sender, "alice");
        assert_eq!(notify.room, "general");

        assert!(h.rooms.members("general", "bob").is_some());
    }

    #[tokio::test]
    async fn test_invite_offline_invitee_is_recorded_silently() {
        let h = Harness::new();
        let mut alice = h.connect("alice");
        h.rooms.create_room("general", "alice").unwrap();

        let raw = br#"{"type":"invite","sender":"alice","recipient":"bob","room":"general"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(outcome, DispatchOutcome::InviteSent { notified: false, .. }));
        // Membership is recorded even though bob never saw the invite.
        assert!(h.rooms.members("general", "bob").is_some());

        let ack = recv_record(&mut alice);
        assert_eq!(ack.kind, kinds::INVITE_SENT);
    }

    #[tokio::test]
    async fn test_invite_missing_fields_rejected() {
        let h = Harness::new();
        let mut alice = h.connect("alice");

        let raw = br#"{"type":"invite","sender":"alice","room":"general"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
        let err = recv_record(&mut alice);
        assert_eq!(err.content, "room and recipient are required for invite");
    }

    #[tokio::test]
    async fn test_invite_by_non_member_rejected() {
        let h = Harness::new();
        let mut mallory = h.connect("mallory");
        h.rooms.create_room("general", "alice").unwrap();

        let raw = br#"{"type":"invite","sender":"mallory","recipient":"bob","room":"general"}"#;
        let outcome = h.dispatch_raw("mallory", raw).await;

        assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
        let err = recv_record(&mut mallory);
        assert_eq!(err.kind, kinds::ERROR);
        assert!(h.rooms.members("general", "bob").is_none());
    }

    #[tokio::test]
    async fn test_room_msg_reaches_members_only() {
        let h = Harness::new();
        let mut alice = h.connect("alice");
        let mut bob = h.connect("bob");
        let mut charlie = h.connect("charlie");
        h.rooms.create_room("general", "alice").unwrap();
        h.rooms.add_member("general", "alice", "bob").unwrap();

        let raw = br#"{"type":"room_msg","sender":"alice","room":"general","content":"hi"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::RoomBroadcast {
                delivered: 1,
                offline: 0,
                failed: 0
            }
        ));

        let msg = recv_record(&mut bob);
        assert_eq!(msg.kind, kinds::ROOM_MSG);
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.room, "general");
        assert_eq!(msg.content, "hi");

        // The sender is excluded and non-members receive nothing.
        assert!(alice.try_recv().is_err());
        assert!(charlie.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_room_msg_from_non_member_drops_silently() {
        let h = Harness::new();
        let mut charlie = h.connect("charlie");
        let mut alice = h.connect("alice");
        h.rooms.create_room("general", "alice").unwrap();

        let raw = br#"{"type":"room_msg","sender":"charlie","room":"general","content":"psst"}"#;
        let outcome = h.dispatch_raw("charlie", raw).await;

        assert!(matches!(outcome, DispatchOutcome::Dropped { .. }));
        // No error record, and the member saw nothing.
        assert!(charlie.try_recv().is_err());
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_room_msg_missing_room_drops_silently() {
        let h = Harness::new();
        let mut alice = h.connect("alice");

        let raw = br#"{"type":"room_msg","sender":"alice","content":"hi"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(outcome, DispatchOutcome::Dropped { .. }));
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_room_msg_fanout_survives_failed_recipient() {
        let h = Harness::new();
        let _alice = h.connect("alice");
        h.rooms.create_room("general", "alice").unwrap();
        h.rooms.add_member("general", "alice", "bob").unwrap();
        h.rooms.add_member("general", "alice", "dave").unwrap();

        // bob's channel is closed, dave's is healthy.
        let bob_rx = h.connect("bob");
        drop(bob_rx);
        let mut dave = h.connect("dave");

        let raw = br#"{"type":"room_msg","sender":"alice","room":"general","content":"hi"}"#;
        let outcome = h.dispatch_raw("alice", raw).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::RoomBroadcast {
                delivered: 1,
                failed: 1,
                ..
            }
        ));
        assert!(dave.try_recv().is_ok());
    }

    /// Full relay scenario: create, invite, broadcast.
    #[tokio::test]
    async fn test_end_to_end_room_flow() {
        let h = Harness::new();
        let mut alice = h.connect("alice");
        let mut bob = h.connect("bob");
        let mut charlie = h.connect("charlie");

        // Alice creates "general".
        h.dispatch_raw(
            "alice",
            br#"{"type":"create_room","sender":"alice","content":"general"}"#,
        )
        .await;
        assert_eq!(
            h.rooms.members("general", "alice").unwrap(),
            vec!["alice".to_string()]
        );
        assert_eq!(recv_record(&mut alice).kind, kinds::ROOM_CREATED);

        // Alice invites Bob.
        h.dispatch_raw(
            "alice",
            br#"{"type":"invite","sender":"alice","recipient":"bob","room":"general"}"#,
        )
        .await;
        assert_eq!(recv_record(&mut alice).kind, kinds::INVITE_SENT);
        let invited = recv_record(&mut bob);
        assert_eq!(invited.kind, kinds::INVITED);
        assert_eq!(invited.room, "general");

        // Alice posts to the room.
        h.dispatch_raw(
            "alice",
            br#"{"type":"room_msg","sender":"alice","room":"general","content":"hi"}"#,
        )
        .await;
        let msg = recv_record(&mut bob);
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.content, "hi");

        // Charlie never joined and receives nothing at all.
        assert!(charlie.try_recv().is_err());
        // Alice got only her two acks.
        assert!(alice.try_recv().is_err());
    }
}
