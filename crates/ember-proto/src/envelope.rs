//! The wire envelope: one JSON object per message, dispatched on `type`.

use serde::{Deserialize, Serialize};

/// A single protocol message.
///
/// The serde representation matches the wire exactly: snake_case `type`
/// tags, camelCase field names. Client-originated envelopes may omit
/// `id`/`timestamp`; the server restamps both before broadcasting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Request to join (or lazily create) a room.
    JoinRoom {
        #[serde(rename = "roomCode")]
        room_code: String,
        username: String,
    },
    /// Join acknowledgement, sent only to the joining session.
    RoomJoined {
        #[serde(rename = "roomCode")]
        room_code: String,
        username: String,
    },
    UserJoined {
        username: String,
        timestamp: i64,
    },
    UserLeft {
        username: String,
        timestamp: i64,
    },
    /// Full member list snapshot for the room.
    UserList { users: Vec<String> },
    ChatMessage {
        #[serde(default)]
        id: String,
        #[serde(default)]
        username: String,
        content: String,
        #[serde(default)]
        timestamp: i64,
    },
    Typing {
        #[serde(default)]
        username: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
        #[serde(default)]
        timestamp: i64,
    },
    Ping {
        #[serde(default)]
        timestamp: i64,
    },
    Pong {
        #[serde(default)]
        timestamp: i64,
    },
    Error {
        message: String,
        timestamp: i64,
    },
}

impl Envelope {
    /// Static label for the variant, used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::RoomJoined { .. } => "room_joined",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::UserList { .. } => "user_list",
            Self::ChatMessage { .. } => "chat_message",
            Self::Typing { .. } => "typing",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }

    pub fn join_room(room_code: impl Into<String>, username: impl Into<String>) -> Self {
        Self::JoinRoom {
            room_code: room_code.into(),
            username: username.into(),
        }
    }

    pub fn room_joined(room_code: impl Into<String>, username: impl Into<String>) -> Self {
        Self::RoomJoined {
            room_code: room_code.into(),
            username: username.into(),
        }
    }

    pub fn user_joined(username: impl Into<String>) -> Self {
        Self::UserJoined {
            username: username.into(),
            timestamp: now_millis(),
        }
    }

    pub fn user_left(username: impl Into<String>) -> Self {
        Self::UserLeft {
            username: username.into(),
            timestamp: now_millis(),
        }
    }

    pub fn user_list(users: Vec<String>) -> Self {
        Self::UserList { users }
    }

    /// A chat message stamped with the current time.
    pub fn chat(
        id: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::ChatMessage {
            id: id.into(),
            username: username.into(),
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn typing(username: impl Into<String>, is_typing: bool) -> Self {
        Self::Typing {
            username: username.into(),
            is_typing,
            timestamp: now_millis(),
        }
    }

    pub fn ping() -> Self {
        Self::Ping {
            timestamp: now_millis(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_millis(),
        }
    }

    pub fn error_notice(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: now_millis(),
        }
    }
}

/// Current time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Mint an opaque message id (UUID v4).
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_wire_tag() {
        assert_eq!(Envelope::ping().kind(), "ping");
        assert_eq!(Envelope::user_list(vec![]).kind(), "user_list");
        assert_eq!(Envelope::chat("1", "Alice", "hi").kind(), "chat_message");
    }

    #[test]
    fn chat_constructor_stamps_timestamp() {
        let before = now_millis();
        let env = Envelope::chat("id-1", "Alice", "hello");
        match env {
            Envelope::ChatMessage { timestamp, .. } => {
                assert!(timestamp >= before);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(new_message_id(), new_message_id());
    }
}
