//! The broadcast router: maps inbound envelopes to registry operations and
//! outbound fan-out.
//!
//! Dispatch table:
//!
//! | inbound        | precondition            | action                                  |
//! |----------------|-------------------------|-----------------------------------------|
//! | `join_room`    | valid code + name       | registry join (ack/joined/list fan-out) |
//! | `chat_message` | joined, non-empty text  | restamp, broadcast to room incl. origin |
//! | `typing`       | joined                  | broadcast to room minus origin          |
//! | `ping`         | —                       | `pong` to origin                        |
//! | close/eviction | was joined              | registry leave, drop from session store |
//!
//! Malformed frames and registry errors produce an `error` envelope for the
//! originator only; the connection is never closed for them.

use crate::error::RegistryError;
use crate::history::StoredMessage;
use crate::state::{Hub, Session, SessionId};
use ember_proto::{decode, new_message_id, now_millis, trim_content, Envelope, ProtoError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a session is being torn down. Logging only; every reason funnels
/// into the same leave-processing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientClosed,
    TransportError,
    IdleTimeout,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::IdleTimeout => "idle_timeout",
        }
    }
}

#[derive(Clone)]
pub struct Router {
    hub: Arc<Hub>,
}

impl Router {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Process one inbound text frame from a connection.
    pub async fn handle_frame(&self, sid: &SessionId, raw: &str) {
        let Some(session) = self.hub.store.get(sid) else {
            return;
        };
        // Any inbound frame counts as liveness.
        session.touch();

        let envelope = match decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.reject_frame(&session, &e);
                return;
            }
        };
        crate::metrics::record_frame(envelope.kind());

        match envelope {
            Envelope::JoinRoom {
                room_code,
                username,
            } => self.join(&session, &room_code, &username).await,
            Envelope::ChatMessage { id, content, .. } => self.chat(&session, id, &content).await,
            Envelope::Typing { is_typing, .. } => self.typing(&session, is_typing),
            Envelope::Ping { .. } => {
                session.try_send(Arc::new(Envelope::pong()));
            }
            other => {
                // Server-to-client variants arriving from a client.
                crate::metrics::record_frame_error("unexpected_variant");
                debug!(%sid, kind = other.kind(), "Unexpected envelope from client");
                session.try_send(Arc::new(Envelope::error_notice(format!(
                    "unexpected {} from client",
                    other.kind()
                ))));
            }
        }
    }

    /// Tear down a session: leave its room, drop it from the store.
    ///
    /// Transport close and liveness eviction both land here; calling it
    /// twice for the same session is a no-op the second time.
    pub async fn handle_disconnect(&self, sid: &SessionId, reason: DisconnectReason) {
        let Some(session) = self.hub.store.remove(sid) else {
            return;
        };
        crate::metrics::set_connected_sessions(self.hub.store.len());

        if let Some(outcome) = self.hub.rooms.leave(&self.hub.store, &session) {
            info!(
                %sid,
                room = %outcome.room_code,
                name = %outcome.display_name,
                reason = reason.as_str(),
                room_deleted = outcome.room_deleted,
                "Session left room"
            );
            if outcome.room_deleted {
                self.hub.history.forget_room(&outcome.room_code).await;
            }
        } else {
            info!(%sid, reason = reason.as_str(), "Session closed");
        }
    }

    async fn join(&self, session: &Arc<Session>, room_code: &str, username: &str) {
        match self
            .hub
            .rooms
            .join(&self.hub.store, session, room_code, username)
        {
            Ok(summary) => {
                info!(
                    sid = %session.sid,
                    room = %summary.room_code,
                    name = %summary.display_name,
                    members = summary.members.len(),
                    "Joined room"
                );
                if let Some(prior) = summary.prior {
                    if prior.room_deleted {
                        self.hub.history.forget_room(&prior.room_code).await;
                    }
                }
            }
            Err(e) => self.reject_op(session, &e),
        }
    }

    async fn chat(&self, session: &Arc<Session>, id: String, content: &str) {
        let Some((room_code, display_name)) = session.joined_room() else {
            self.reject_op(session, &RegistryError::NotInRoom);
            return;
        };
        let Some(content) = trim_content(content) else {
            self.reject_op(session, &RegistryError::EmptyContent);
            return;
        };

        // Keep the client's id when it supplied one so its own echo is
        // recognizable; otherwise mint one. The timestamp is always ours.
        let id = if id.is_empty() { new_message_id() } else { id };
        let timestamp = now_millis();
        let envelope = Arc::new(Envelope::ChatMessage {
            id: id.clone(),
            username: display_name.clone(),
            content: content.to_string(),
            timestamp,
        });

        let delivered = self
            .hub
            .rooms
            .broadcast(&self.hub.store, &room_code, envelope, None);
        crate::metrics::record_fanout(delivered);

        let stored = StoredMessage {
            id,
            username: display_name,
            content: content.to_string(),
            timestamp,
        };
        if let Err(e) = self.hub.history.save_message(&room_code, stored).await {
            warn!(room = %room_code, error = %e, "Failed to mirror chat message");
        }
    }

    fn typing(&self, session: &Arc<Session>, is_typing: bool) {
        let Some((room_code, display_name)) = session.joined_room() else {
            self.reject_op(session, &RegistryError::NotInRoom);
            return;
        };
        let envelope = Arc::new(Envelope::typing(display_name, is_typing));
        self.hub
            .rooms
            .broadcast(&self.hub.store, &room_code, envelope, Some(&session.sid));
    }

    fn reject_frame(&self, session: &Arc<Session>, error: &ProtoError) {
        crate::metrics::record_frame_error("malformed");
        debug!(sid = %session.sid, error = %error, "Discarding malformed frame");
        session.try_send(Arc::new(Envelope::error_notice(error.to_string())));
    }

    fn reject_op(&self, session: &Arc<Session>, error: &RegistryError) {
        crate::metrics::record_frame_error(error.error_code());
        debug!(sid = %session.sid, code = error.error_code(), "Rejected operation");
        session.try_send(Arc::new(error.to_wire()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryStore, MemoryHistory};
    use ember_proto::Envelope;
    use tokio::sync::mpsc;

    fn test_router() -> Router {
        let history = Arc::new(MemoryHistory::new(16));
        Router::new(Arc::new(Hub::new(32, history)))
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<Envelope>>) -> Vec<Arc<Envelope>> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    async fn join(router: &Router, sid: &SessionId, room: &str, name: &str) {
        router
            .handle_frame(
                sid,
                &format!(r#"{{"type":"join_room","roomCode":"{room}","username":"{name}"}}"#),
            )
            .await;
    }

    #[tokio::test]
    async fn chat_reaches_all_members_with_identical_id() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();
        let (b, mut rx_b) = router.hub().store.create();

        join(&router, &a.sid, "ab12cd", "Alice").await;
        join(&router, &b.sid, "AB12CD", "Bob").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        router
            .handle_frame(&a.sid, r#"{"type":"chat_message","content":"hello"}"#)
            .await;

        let to_a = drain(&mut rx_a);
        let to_b = drain(&mut rx_b);
        let chat_a = to_a.iter().find_map(|env| match &**env {
            Envelope::ChatMessage { id, content, .. } => Some((id.clone(), content.clone())),
            _ => None,
        });
        let chat_b = to_b.iter().find_map(|env| match &**env {
            Envelope::ChatMessage { id, content, .. } => Some((id.clone(), content.clone())),
            _ => None,
        });

        let (id_a, content_a) = chat_a.expect("sender did not receive its own message");
        let (id_b, content_b) = chat_b.expect("other member did not receive the message");
        assert_eq!(content_a, "hello");
        assert_eq!(content_b, "hello");
        assert_eq!(id_a, id_b);
        assert!(!id_a.is_empty());
    }

    #[tokio::test]
    async fn client_supplied_chat_id_is_preserved() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();
        join(&router, &a.sid, "AB12CD", "Alice").await;
        drain(&mut rx_a);

        router
            .handle_frame(
                &a.sid,
                r#"{"type":"chat_message","id":"client-7","content":"hi"}"#,
            )
            .await;

        let got = drain(&mut rx_a);
        assert!(got.iter().any(|env| matches!(
            &**env,
            Envelope::ChatMessage { id, .. } if id == "client-7"
        )));
    }

    #[tokio::test]
    async fn typing_is_never_echoed_to_the_originator() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();
        let (b, mut rx_b) = router.hub().store.create();
        join(&router, &a.sid, "AB12CD", "Alice").await;
        join(&router, &b.sid, "AB12CD", "Bob").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        router
            .handle_frame(&a.sid, r#"{"type":"typing","isTyping":true}"#)
            .await;

        assert!(drain(&mut rx_a).is_empty());
        let to_b = drain(&mut rx_b);
        assert!(to_b.iter().any(|env| matches!(
            &**env,
            Envelope::Typing { username, is_typing, .. } if username == "Alice" && *is_typing
        )));
    }

    #[tokio::test]
    async fn chat_without_room_or_content_is_rejected_to_origin_only() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();

        router
            .handle_frame(&a.sid, r#"{"type":"chat_message","content":"hi"}"#)
            .await;
        let got = drain(&mut rx_a);
        assert!(matches!(&*got[0], Envelope::Error { .. }));

        join(&router, &a.sid, "AB12CD", "Alice").await;
        drain(&mut rx_a);
        router
            .handle_frame(&a.sid, r#"{"type":"chat_message","content":"   "}"#)
            .await;
        let got = drain(&mut rx_a);
        assert!(matches!(&*got[0], Envelope::Error { .. }));

        // The session is still usable afterwards.
        router
            .handle_frame(&a.sid, r#"{"type":"chat_message","content":"ok"}"#)
            .await;
        let got = drain(&mut rx_a);
        assert!(got
            .iter()
            .any(|env| matches!(&**env, Envelope::ChatMessage { .. })));
    }

    #[tokio::test]
    async fn malformed_frames_answer_with_error_and_keep_the_session() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();

        router.handle_frame(&a.sid, "not json at all").await;
        let got = drain(&mut rx_a);
        assert!(matches!(&*got[0], Envelope::Error { .. }));

        router
            .handle_frame(&a.sid, r#"{"type":"subspace_anomaly"}"#)
            .await;
        let got = drain(&mut rx_a);
        assert!(matches!(&*got[0], Envelope::Error { .. }));

        assert!(router.hub().store.get(&a.sid).is_some());
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();

        router
            .handle_frame(&a.sid, r#"{"type":"ping","timestamp":123}"#)
            .await;
        let got = drain(&mut rx_a);
        assert!(matches!(&*got[0], Envelope::Pong { .. }));
    }

    #[tokio::test]
    async fn disconnect_runs_leave_processing_once() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();
        let (b, mut rx_b) = router.hub().store.create();
        join(&router, &a.sid, "AB12CD", "Alice").await;
        join(&router, &b.sid, "AB12CD", "Bob").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        router
            .handle_disconnect(&a.sid, DisconnectReason::ClientClosed)
            .await;
        // Idempotent: the eviction path may race the close path.
        router
            .handle_disconnect(&a.sid, DisconnectReason::IdleTimeout)
            .await;

        let to_b = drain(&mut rx_b);
        let lefts = to_b
            .iter()
            .filter(|env| matches!(&***env, Envelope::UserLeft { .. }))
            .count();
        assert_eq!(lefts, 1);
        assert_eq!(
            router.hub().rooms.members_of("AB12CD"),
            Some(vec!["Bob".to_string()])
        );
    }

    #[tokio::test]
    async fn disconnect_of_last_member_deletes_room_and_history() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();
        join(&router, &a.sid, "AB12CD", "Alice").await;
        drain(&mut rx_a);
        router
            .handle_frame(&a.sid, r#"{"type":"chat_message","content":"hello"}"#)
            .await;

        router
            .handle_disconnect(&a.sid, DisconnectReason::ClientClosed)
            .await;

        assert!(router.hub().rooms.is_empty());
        assert!(router
            .hub()
            .history
            .chat_history("AB12CD")
            .await
            .expect("history read")
            .is_empty());
    }

    #[tokio::test]
    async fn chat_is_mirrored_into_history() {
        let router = test_router();
        let (a, mut rx_a) = router.hub().store.create();
        join(&router, &a.sid, "AB12CD", "Alice").await;
        drain(&mut rx_a);

        router
            .handle_frame(&a.sid, r#"{"type":"chat_message","content":"hello"}"#)
            .await;

        let log = router
            .hub()
            .history
            .chat_history("AB12CD")
            .await
            .expect("history read");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].username, "Alice");
        assert_eq!(log[0].content, "hello");
    }
}
