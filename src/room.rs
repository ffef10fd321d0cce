use crate::signal::{ConnectionId, MemberInfo};
use crate::{Error, Result};
use std::collections::HashMap;

/// A connection admitted to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: ConnectionId,
    pub display_name: String,
    pub avatar: String,
    pub room_id: String,
}

impl Member {
    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

// Members in join order. A room only exists while this is non-empty.
#[derive(Debug, Default)]
struct Room {
    members: Vec<Member>,
}

/// Outcome of a successful join.
#[derive(Debug)]
pub struct Joined {
    pub room_id: String,
    /// The joiner as stored in the room.
    pub member: Member,
    /// Members present before the joiner was inserted, in join order.
    pub existing: Vec<Member>,
    /// The membership the joiner held before, retired as part of this join.
    pub previous: Option<Departure>,
}

/// Outcome of removing a member.
#[derive(Debug)]
pub struct Departure {
    pub room_id: String,
    pub member: Member,
    /// Members still in the room, to be told about the departure.
    pub remaining: Vec<ConnectionId>,
}

impl Departure {
    pub fn remaining_count(&self) -> usize {
        self.remaining.len()
    }

    pub fn room_deleted(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// In-memory room registry. All membership changes go through
/// [`RoomRegistry::join`] and [`RoomRegistry::leave`].
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    index: HashMap<ConnectionId, String>,
}

pub fn normalize_room_id(room_id: &str) -> String {
    room_id.trim().to_lowercase()
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `id` to `room_id`, leaving any room it is already in first.
    ///
    /// Input is validated before the implicit leave, so a rejected join
    /// keeps the previous membership.
    pub fn join(
        &mut self,
        id: &ConnectionId,
        room_id: &str,
        display_name: &str,
        avatar: &str,
    ) -> Result<Joined> {
        let room_id = normalize_room_id(room_id);
        let display_name = display_name.trim();
        if room_id.is_empty() {
            return Err(Error::EmptyRoomId);
        }
        if display_name.is_empty() {
            return Err(Error::EmptyDisplayName);
        }

        let previous = self.leave(id);

        let room = self.rooms.entry(room_id.clone()).or_default();
        let existing = room.members.clone();
        let member = Member {
            id: id.clone(),
            display_name: display_name.to_string(),
            avatar: avatar.trim().to_string(),
            room_id: room_id.clone(),
        };
        room.members.push(member.clone());
        self.index.insert(id.clone(), room_id.clone());

        Ok(Joined {
            room_id,
            member,
            existing,
            previous,
        })
    }

    /// Remove `id` from its room. Returns `None` if it was not a member.
    pub fn leave(&mut self, id: &ConnectionId) -> Option<Departure> {
        let room_id = self.index.remove(id)?;
        let room = self.rooms.get_mut(&room_id)?;
        let position = room.members.iter().position(|m| &m.id == id)?;
        let member = room.members.remove(position);
        let remaining: Vec<ConnectionId> = room.members.iter().map(|m| m.id.clone()).collect();

        if remaining.is_empty() {
            self.rooms.remove(&room_id);
        }

        Some(Departure {
            room_id,
            member,
            remaining,
        })
    }

    pub fn room_of(&self, id: &ConnectionId) -> Option<&str> {
        self.index.get(id).map(String::as_str)
    }

    pub fn member(&self, id: &ConnectionId) -> Option<&Member> {
        let room = self.rooms.get(self.index.get(id)?)?;
        room.members.iter().find(|m| &m.id == id)
    }

    pub fn members(&self, room_id: &str) -> Option<&[Member]> {
        self.rooms
            .get(&normalize_room_id(room_id))
            .map(|room| room.members.as_slice())
    }

    pub fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(&normalize_room_id(room_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
