//! Per-connection session state and the store that owns it.
//!
//! The `SessionStore` is the sole owner of transport handles: each session
//! holds the bounded sender for its connection's outbound queue, and
//! removing a session from the store drops that sender, which ends the
//! connection's write loop. The room registry references sessions by id
//! only.

use crate::state::sid::{SessionId, SidGenerator};
use dashmap::DashMap;
use ember_proto::Envelope;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

/// Display name and room membership, set together on a successful join.
#[derive(Default)]
struct Membership {
    display_name: Option<String>,
    room_code: Option<String>,
}

/// One active participant connection.
pub struct Session {
    pub sid: SessionId,
    membership: Mutex<Membership>,
    last_seen: Mutex<Instant>,
    sender: mpsc::Sender<Arc<Envelope>>,
}

impl Session {
    fn new(sid: SessionId, sender: mpsc::Sender<Arc<Envelope>>) -> Self {
        Self {
            sid,
            membership: Mutex::new(Membership::default()),
            last_seen: Mutex::new(Instant::now()),
            sender,
        }
    }

    /// The room this session is in, as `(room_code, display_name)`.
    pub fn joined_room(&self) -> Option<(String, String)> {
        let m = self.membership.lock();
        match (&m.room_code, &m.display_name) {
            (Some(room), Some(name)) => Some((room.clone(), name.clone())),
            _ => None,
        }
    }

    /// Record a successful join.
    pub fn begin_membership(&self, room_code: String, display_name: String) {
        let mut m = self.membership.lock();
        m.room_code = Some(room_code);
        m.display_name = Some(display_name);
    }

    /// Clear room membership, returning `(room_code, display_name)` if the
    /// session was joined. The display name is kept for logging but the
    /// session is no longer addressable through any room.
    pub fn take_room(&self) -> Option<(String, String)> {
        let mut m = self.membership.lock();
        let room = m.room_code.take()?;
        let name = m.display_name.clone().unwrap_or_default();
        Some((room, name))
    }

    /// Refresh the liveness timestamp. Called for every inbound frame.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// How long since this session last sent anything.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Queue an envelope for delivery, without blocking.
    ///
    /// A full queue means the member is too slow to keep up; the envelope
    /// is dropped so broadcast to the rest of the room is never stalled.
    pub fn try_send(&self, envelope: Arc<Envelope>) -> bool {
        match self.sender.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(env)) => {
                crate::metrics::record_send_drop();
                warn!(sid = %self.sid, kind = env.kind(), "Send queue full, dropping envelope");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, by: Duration) {
        let mut last_seen = self.last_seen.lock();
        if let Some(earlier) = last_seen.checked_sub(by) {
            *last_seen = earlier;
        }
    }
}

/// All live sessions, keyed by server-issued id.
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Session>>,
    sid_gen: SidGenerator,
    send_queue: usize,
}

impl SessionStore {
    pub fn new(send_queue: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            sid_gen: SidGenerator::new(),
            send_queue,
        }
    }

    /// Create a session and its outbound queue receiver.
    ///
    /// The caller (the connection task) keeps only the id and the receiver;
    /// the store keeps the session and its sender.
    pub fn create(&self) -> (Arc<Session>, mpsc::Receiver<Arc<Envelope>>) {
        let (tx, rx) = mpsc::channel(self.send_queue);
        let sid = self.sid_gen.next();
        let session = Arc::new(Session::new(sid.clone(), tx));
        self.sessions.insert(sid, Arc::clone(&session));
        (session, rx)
    }

    pub fn get(&self, sid: &str) -> Option<Arc<Session>> {
        self.sessions.get(sid).map(|entry| Arc::clone(&entry))
    }

    /// Remove a session, dropping its outbound sender.
    pub fn remove(&self, sid: &str) -> Option<Arc<Session>> {
        self.sessions.remove(sid).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Deliver to one session if it is still writable.
    pub fn send_to(&self, sid: &str, envelope: Arc<Envelope>) -> bool {
        match self.sessions.get(sid) {
            Some(session) => session.try_send(envelope),
            None => false,
        }
    }

    /// Snapshot of sessions idle longer than `timeout`.
    pub fn stale(&self, timeout: Duration) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.idle_for() > timeout)
            .map(|entry| entry.sid.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_remove() {
        let store = SessionStore::new(8);
        let (session, _rx) = store.create();
        assert_eq!(store.len(), 1);
        assert!(store.get(&session.sid).is_some());

        store.remove(&session.sid);
        assert!(store.get(&session.sid).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let store = SessionStore::new(1);
        let (session, mut rx) = store.create();

        assert!(session.try_send(Arc::new(Envelope::ping())));
        // Queue capacity is 1; the second send must drop, not block.
        assert!(!session.try_send(Arc::new(Envelope::pong())));

        let delivered = rx.try_recv().expect("first envelope should be queued");
        assert_eq!(delivered.kind(), "ping");
    }

    #[test]
    fn removal_closes_the_receiver() {
        let store = SessionStore::new(8);
        let (session, mut rx) = store.create();
        let sid = session.sid.clone();
        drop(session);

        store.remove(&sid);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn stale_scan_picks_only_idle_sessions() {
        let store = SessionStore::new(8);
        let (idle, _rx_a) = store.create();
        let (_fresh, _rx_b) = store.create();

        idle.backdate(Duration::from_secs(600));
        let stale = store.stale(Duration::from_secs(300));
        assert_eq!(stale, vec![idle.sid.clone()]);

        idle.touch();
        assert!(store.stale(Duration::from_secs(300)).is_empty());
    }

    #[test]
    fn membership_round_trip() {
        let store = SessionStore::new(8);
        let (session, _rx) = store.create();
        assert!(session.joined_room().is_none());

        session.begin_membership("AB12CD".into(), "Alice".into());
        assert_eq!(
            session.joined_room(),
            Some(("AB12CD".into(), "Alice".into()))
        );

        assert_eq!(session.take_room(), Some(("AB12CD".into(), "Alice".into())));
        assert!(session.joined_room().is_none());
        assert!(session.take_room().is_none());
    }
}
