//! History collaborator abstraction.
//!
//! Mirrors chat messages that were broadcast so a UI can replay them. The
//! router only ever writes through this interface and never reads it back
//! for correctness; a backend failure degrades history, not chat.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// A chat message as it was broadcast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub username: String,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history backend unavailable: {0}")]
    Backend(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Mirror a broadcast chat message.
    async fn save_message(&self, room_code: &str, msg: StoredMessage) -> Result<(), HistoryError>;

    /// Messages recorded for a room, oldest first.
    async fn chat_history(&self, room_code: &str) -> Result<Vec<StoredMessage>, HistoryError>;

    /// Discard a room's history when the room is deleted.
    async fn forget_room(&self, room_code: &str);
}

/// In-memory history with a per-room cap. All state is lost on process
/// restart, which is exactly the retention this system promises.
pub struct MemoryHistory {
    per_room_cap: usize,
    rooms: Mutex<HashMap<String, VecDeque<StoredMessage>>>,
}

impl MemoryHistory {
    pub fn new(per_room_cap: usize) -> Self {
        Self {
            per_room_cap: per_room_cap.max(1),
            rooms: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn save_message(&self, room_code: &str, msg: StoredMessage) -> Result<(), HistoryError> {
        let mut rooms = self.rooms.lock();
        let log = rooms.entry(room_code.to_string()).or_default();
        if log.len() == self.per_room_cap {
            log.pop_front();
        }
        log.push_back(msg);
        Ok(())
    }

    async fn chat_history(&self, room_code: &str) -> Result<Vec<StoredMessage>, HistoryError> {
        let rooms = self.rooms.lock();
        Ok(rooms
            .get(room_code)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn forget_room(&self, room_code: &str) {
        self.rooms.lock().remove(room_code);
    }
}
