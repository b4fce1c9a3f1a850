//! Events surfaced to the UI collaborator.

/// Connection manager state, reported through
/// [`ClientEvent::Connection`] whenever it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Offline mode: events are fabricated locally, no network traffic.
    SimulationFallback,
}

/// Events delivered on the channel returned by
/// [`crate::RoomClient::join`].
///
/// Live traffic and the simulation fallback produce exactly the same
/// shapes, so consumers never need to know which mode is active.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The connection manager changed state.
    Connection(ConnectionState),
    /// The join was acknowledged (initially, after each reconnect, and on
    /// entering simulation).
    Joined { room_code: String, username: String },
    Message {
        id: String,
        username: String,
        content: String,
        timestamp: i64,
    },
    UserList(Vec<String>),
    UserJoined { username: String, timestamp: i64 },
    UserLeft { username: String, timestamp: i64 },
    Typing { username: String, is_typing: bool },
    /// A server-reported error (invalid input, protocol misuse). Never
    /// fatal to the connection.
    Notice { message: String },
}
