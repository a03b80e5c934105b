//! Room registry implementation.
//!
//! Tracks named rooms and their member sets. Rooms persist for the process
//! lifetime once created and membership only grows; there is no leave or
//! kick operation in the current contract.

use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, instrument};

use crate::RelayError;

/// A chat room with a set of member identities.
///
/// Membership is nominal: members need not be online, and insertion order
/// carries no meaning.
#[derive(Debug, Clone)]
pub struct Room {
    /// Room name, unique across the registry
    pub name: String,
    /// Identities allowed to read and post
    pub members: HashSet<String>,
}

impl Room {
    fn new(name: String, creator: &str) -> Self {
        let mut members = HashSet::new();
        members.insert(creator.to_string());
        Self { name, members }
    }

    /// Check if an identity belongs to this room.
    pub fn is_member(&self, identity: &str) -> bool {
        self.members.contains(identity)
    }

    /// Number of members, online or not.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Registry for tracking rooms and their membership.
///
/// Thread-safe registry mapping room names to [`Room`]s, independent of the
/// connection registry. Membership checks fail closed: a room is invisible
/// to anyone who is not a member.
pub struct RoomRegistry {
    /// Map of room name to room
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    /// Create a new room registry.
    pub fn new() -> Self {
        info!("Creating room registry");
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Create a room with `creator` as its sole member.
    ///
    /// Fails with [`RelayError::RoomExists`] if the name is already taken.
    /// The existence check and the insert are one atomic entry operation so
    /// two concurrent creators cannot both succeed.
    #[instrument(skip(self), fields(room = %name, creator = %creator))]
    pub fn create_room(&self, name: &str, creator: &str) -> Result<(), RelayError> {
        match self.rooms.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RelayError::room_exists(name)),
            Entry::Vacant(vacant) => {
                vacant.insert(Room::new(name.to_string(), creator));
                info!("Room created");
                Ok(())
            }
        }
    }

    /// Add `invitee` to a room on behalf of `inviter`.
    ///
    /// Only existing members may extend membership. The invitee does not
    /// need to be online; offline invites are recorded silently. Re-adding
    /// an existing member is a successful no-op.
    #[instrument(skip(self), fields(room = %room, inviter = %inviter, invitee = %invitee))]
    pub fn add_member(&self, room: &str, inviter: &str, invitee: &str) -> Result<(), RelayError> {
        let mut entry = self
            .rooms
            .get_mut(room)
            .ok_or_else(|| RelayError::room_not_found(room))?;

        if !entry.is_member(inviter) {
            return Err(RelayError::not_a_member(room));
        }

        entry.members.insert(invitee.to_string());
        debug!("Member added");
        Ok(())
    }

    /// Get the member set of a room, visible to members only.
    ///
    /// Returns None both when the room does not exist and when the
    /// requester is not a member; callers cannot probe for room existence.
    pub fn members(&self, room: &str, requester: &str) -> Option<Vec<String>> {
        let entry = self.rooms.get(room)?;
        if !entry.is_member(requester) {
            debug!(room = %room, requester = %requester, "Membership not visible to requester");
            return None;
        }
        Some(entry.members.iter().cloned().collect())
    }

    /// Check if a room exists.
    pub fn room_exists(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    /// Number of members in a room, or None if the room does not exist.
    pub fn member_count(&self, name: &str) -> Option<usize> {
        self.rooms.get(name).map(|room| room.member_count())
    }

    /// Get the number of rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// List all room names.
    ///
    /// Useful for debugging and monitoring.
    pub fn list_rooms(&self) -> Vec<String> {
        self.rooms.iter().map(|r| r.key().clone()).collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("room_count", &self.rooms.len())
            .finish()
    }
}
