//! Shared server state: sessions, rooms, and the hub that ties them to the
//! history collaborator.

mod rooms;
mod session;
mod sid;

pub use rooms::{JoinSummary, LeaveOutcome, Room, RoomRegistry};
pub use session::{Session, SessionStore};
pub use sid::{SessionId, SidGenerator};

use crate::history::HistoryStore;
use std::sync::Arc;

/// The state shared by every connection task and the liveness reaper.
///
/// The session store owns transports; the room registry references
/// sessions by id only.
pub struct Hub {
    pub store: SessionStore,
    pub rooms: RoomRegistry,
    pub history: Arc<dyn HistoryStore>,
}

impl Hub {
    pub fn new(send_queue: usize, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            store: SessionStore::new(send_queue),
            rooms: RoomRegistry::new(),
            history,
        }
    }
}
