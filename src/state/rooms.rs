//! The room registry: authoritative mapping from room code to members.
//!
//! A room exists only while it has at least one member. Membership changes
//! and the resulting fan-out are performed while the room's map entry is
//! exclusively held, so the ack/joined/list (or left/list) sequences are
//! never observed interleaved with another join or leave in the same room.
//! Delivery under the entry is safe because sends are non-blocking
//! `try_send` calls, never awaits.

use crate::error::RegistryError;
use crate::state::session::{Session, SessionStore};
use crate::state::sid::SessionId;
use dashmap::DashMap;
use ember_proto::{normalize_room_code, validate_display_name, Envelope};
use std::sync::Arc;

struct Member {
    sid: SessionId,
    name: String,
}

/// Members of one room, in join order.
#[derive(Default)]
pub struct Room {
    members: Vec<Member>,
}

impl Room {
    fn names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }
}

/// Result of a successful join.
#[derive(Debug)]
pub struct JoinSummary {
    pub room_code: String,
    pub display_name: String,
    pub members: Vec<String>,
    /// Leave processing for the room the session was in before, if any.
    pub prior: Option<LeaveOutcome>,
}

/// Result of removing a session from its room.
#[derive(Debug)]
pub struct LeaveOutcome {
    pub room_code: String,
    pub display_name: String,
    /// True when this departure removed the room's last member.
    pub room_deleted: bool,
}

pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Join a room, creating it if absent.
    ///
    /// Validates both inputs, detaches the session from any prior room
    /// first, then inserts and emits the join sequence: `room_joined` to the
    /// origin, `user_joined` to everyone else, `user_list` to the whole
    /// room.
    pub fn join(
        &self,
        store: &SessionStore,
        session: &Session,
        room_code: &str,
        display_name: &str,
    ) -> Result<JoinSummary, RegistryError> {
        let room_code = normalize_room_code(room_code)?;
        let display_name = validate_display_name(display_name)?;

        // A session is in at most one room; joining implies leaving.
        let prior = self.leave(store, session);

        let members;
        {
            let mut room = self.rooms.entry(room_code.clone()).or_default();
            room.members.push(Member {
                sid: session.sid.clone(),
                name: display_name.clone(),
            });
            session.begin_membership(room_code.clone(), display_name.clone());
            members = room.names();

            store.send_to(
                &session.sid,
                Arc::new(Envelope::room_joined(&room_code, &display_name)),
            );

            let joined = Arc::new(Envelope::user_joined(&display_name));
            for member in room.members.iter().filter(|m| m.sid != session.sid) {
                store.send_to(&member.sid, Arc::clone(&joined));
            }

            let list = Arc::new(Envelope::user_list(members.clone()));
            for member in &room.members {
                store.send_to(&member.sid, Arc::clone(&list));
            }
        }
        crate::metrics::set_active_rooms(self.rooms.len());

        Ok(JoinSummary {
            room_code,
            display_name,
            members,
            prior,
        })
    }

    /// Remove a session from its current room; no-op when not joined.
    ///
    /// When members remain, they receive `user_left` then `user_list`.
    /// When the last member departs the room is deleted synchronously.
    pub fn leave(&self, store: &SessionStore, session: &Session) -> Option<LeaveOutcome> {
        let (room_code, display_name) = session.take_room()?;

        let mut emptied = false;
        if let Some(mut room) = self.rooms.get_mut(&room_code) {
            room.members.retain(|m| m.sid != session.sid);
            if room.members.is_empty() {
                emptied = true;
            } else {
                let left = Arc::new(Envelope::user_left(&display_name));
                for member in &room.members {
                    store.send_to(&member.sid, Arc::clone(&left));
                }
                let list = Arc::new(Envelope::user_list(room.names()));
                for member in &room.members {
                    store.send_to(&member.sid, Arc::clone(&list));
                }
            }
        }
        if emptied {
            // Re-checked under the entry: a join that raced in between
            // keeps the room alive.
            self.rooms.remove_if(&room_code, |_, room| room.members.is_empty());
        }
        crate::metrics::set_active_rooms(self.rooms.len());

        Some(LeaveOutcome {
            room_code,
            display_name,
            room_deleted: emptied,
        })
    }

    /// Fan an envelope out to the room's current members.
    ///
    /// Returns the number of members the envelope was queued for. Members
    /// whose transport is no longer writable are skipped.
    pub fn broadcast(
        &self,
        store: &SessionStore,
        room_code: &str,
        envelope: Arc<Envelope>,
        skip: Option<&SessionId>,
    ) -> usize {
        let Some(room) = self.rooms.get(room_code) else {
            return 0;
        };
        let mut delivered = 0;
        for member in &room.members {
            if skip == Some(&member.sid) {
                continue;
            }
            if store.send_to(&member.sid, Arc::clone(&envelope)) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Snapshot of display names in a room.
    pub fn members_of(&self, room_code: &str) -> Option<Vec<String>> {
        self.rooms.get(room_code).map(|room| room.names())
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
