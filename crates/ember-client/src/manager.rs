//! The connection manager: a handle plus one background driver task.
//!
//! The driver owns the transport and every timer (heartbeat, pong
//! deadline, reconnect backoff, simulation schedule). All of them live on
//! its stack, so when the driver returns - on leave, normal close, or
//! handle drop - no timer can fire after teardown.

use crate::backoff;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::event::{ClientEvent, ConnectionState};
use crate::simulation::{SimEvent, Simulation};
use ember_proto::{
    decode, encode, new_message_id, normalize_room_code, now_millis, validate_display_name,
    Envelope, ROOM_CODE_LEN,
};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `shutdown` waits for the driver before aborting it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Generate a random 6-character room code for "create room".
///
/// The server creates rooms lazily on first join, so creating is just
/// joining a code nobody else has picked.
pub fn random_room_code() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

enum Command {
    SendChat(String),
    SetTyping(bool),
    Leave,
}

/// Handle to a running connection manager.
///
/// Dropping the handle is equivalent to [`RoomClient::leave`]: the driver
/// observes the closed command channel and tears down.
pub struct RoomClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl RoomClient {
    /// Validate the inputs, spawn the driver, and begin joining.
    ///
    /// Returns the handle and the event channel. The first event is always
    /// `Connection(Connecting)`.
    pub fn join(
        config: ClientConfig,
        room_code: &str,
        display_name: &str,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>), ClientError> {
        let room_code = normalize_room_code(room_code)?;
        let display_name = validate_display_name(display_name)?;

        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(config, room_code, display_name, cmd_rx, events_tx));

        Ok((Self { cmd_tx, task }, events_rx))
    }

    pub fn send_chat(&self, content: impl Into<String>) -> Result<(), ClientError> {
        self.cmd_tx
            .send(Command::SendChat(content.into()))
            .map_err(|_| ClientError::Closed)
    }

    pub fn set_typing(&self, is_typing: bool) -> Result<(), ClientError> {
        self.cmd_tx
            .send(Command::SetTyping(is_typing))
            .map_err(|_| ClientError::Closed)
    }

    /// Leave the room and tear the driver down.
    pub fn leave(&self) {
        let _ = self.cmd_tx.send(Command::Leave);
    }

    /// Leave and wait for the driver to finish; abort it if it does not
    /// wind down within a short timeout.
    pub async fn shutdown(mut self) {
        let _ = self.cmd_tx.send(Command::Leave);
        if timeout(SHUTDOWN_TIMEOUT, &mut self.task).await.is_err() {
            warn!("Driver did not stop in time, aborting");
            self.task.abort();
        }
    }
}

// ── Driver ──────────────────────────────────────────────────────────

async fn drive(
    config: ClientConfig,
    room_code: String,
    display_name: String,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ClientEvent>,
) {
    let _ = events
        .send(ClientEvent::Connection(ConnectionState::Connecting))
        .await;

    // Initial connect: a single attempt, then straight to simulation so
    // the participant gets a usable room view instead of an error.
    let mut ws = match establish(&config, &room_code, &display_name).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "Initial connect failed, entering simulation");
            run_simulation(&config, &room_code, &display_name, &mut cmd_rx, &events).await;
            return;
        }
    };

    loop {
        let _ = events
            .send(ClientEvent::Connection(ConnectionState::Connected))
            .await;
        let _ = events
            .send(ClientEvent::Joined {
                room_code: room_code.clone(),
                username: display_name.clone(),
            })
            .await;

        match run_connected(&config, &display_name, ws, &mut cmd_rx, &events).await {
            ConnectedExit::Ended => {
                let _ = events
                    .send(ClientEvent::Connection(ConnectionState::Disconnected))
                    .await;
                return;
            }
            ConnectedExit::Lost => {
                let _ = events
                    .send(ClientEvent::Connection(ConnectionState::Reconnecting))
                    .await;
                match reconnect(&config, &room_code, &display_name, &mut cmd_rx).await {
                    ReconnectOutcome::Connected(new_ws) => {
                        // Fresh budget for the next outage.
                        ws = new_ws;
                    }
                    ReconnectOutcome::GaveUp => {
                        run_simulation(&config, &room_code, &display_name, &mut cmd_rx, &events)
                            .await;
                        return;
                    }
                    ReconnectOutcome::Cancelled => {
                        let _ = events
                            .send(ClientEvent::Connection(ConnectionState::Disconnected))
                            .await;
                        return;
                    }
                }
            }
        }
    }
}

/// Open the transport, send the join request, and wait for the ack.
async fn establish(
    config: &ClientConfig,
    room_code: &str,
    display_name: &str,
) -> Result<WsStream, ClientError> {
    let (mut ws, _response) =
        match timeout(config.join_timeout, connect_async(config.server_url.as_str())).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::Timeout),
        };

    let join = Envelope::join_room(room_code, display_name);
    ws.send(Message::Text(encode(&join))).await?;

    let deadline = Instant::now() + config.join_timeout;
    loop {
        let frame = match timeout_at(deadline, ws.next()).await {
            Ok(frame) => frame,
            Err(_) => return Err(ClientError::Timeout),
        };
        match frame {
            Some(Ok(Message::Text(text))) => match decode(&text) {
                Ok(Envelope::RoomJoined { .. }) => return Ok(ws),
                Ok(Envelope::Error { message, .. }) => return Err(ClientError::Rejected(message)),
                Ok(_) => {} // other room traffic may precede the ack
                Err(e) => debug!(error = %e, "Ignoring malformed frame during handshake"),
            },
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::HandshakeClosed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

enum ConnectedExit {
    /// Normal end: leave command, handle drop, or server-side normal close.
    Ended,
    /// Abnormal end: transport failure, non-normal close, heartbeat
    /// timeout. Drives reconnection.
    Lost,
}

async fn run_connected(
    config: &ClientConfig,
    display_name: &str,
    mut ws: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<ClientEvent>,
) -> ConnectedExit {
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    // First tick fires immediately, we don't want that.
    heartbeat.tick().await;
    let mut ping_sent_at: Option<Instant> = None;

    loop {
        let pong_deadline_at = ping_sent_at.map(|at| at + config.heartbeat_timeout);
        let pong_deadline = async move {
            match pong_deadline_at {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode(&text) {
                    Ok(Envelope::Pong { .. }) => {
                        ping_sent_at = None;
                    }
                    Ok(Envelope::Ping { .. }) => {
                        if ws.send(Message::Text(encode(&Envelope::pong()))).await.is_err() {
                            return ConnectedExit::Lost;
                        }
                    }
                    Ok(envelope) => deliver(events, envelope),
                    Err(e) => debug!(error = %e, "Ignoring malformed frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let normal = frame
                        .as_ref()
                        .map(|f| f.code == CloseCode::Normal)
                        .unwrap_or(false);
                    debug!(normal, "Server closed the connection");
                    return if normal { ConnectedExit::Ended } else { ConnectedExit::Lost };
                }
                Some(Ok(Message::Ping(payload))) => {
                    if ws.send(Message::Pong(payload)).await.is_err() {
                        return ConnectedExit::Lost;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Transport error");
                    return ConnectedExit::Lost;
                }
                None => return ConnectedExit::Lost,
            },

            cmd = cmd_rx.recv() => match cmd {
                Some(Command::SendChat(content)) => {
                    let envelope = Envelope::ChatMessage {
                        id: new_message_id(),
                        username: display_name.to_string(),
                        content,
                        timestamp: now_millis(),
                    };
                    if ws.send(Message::Text(encode(&envelope))).await.is_err() {
                        return ConnectedExit::Lost;
                    }
                }
                Some(Command::SetTyping(is_typing)) => {
                    let envelope = Envelope::typing(display_name, is_typing);
                    if ws.send(Message::Text(encode(&envelope))).await.is_err() {
                        return ConnectedExit::Lost;
                    }
                }
                Some(Command::Leave) | None => {
                    let _ = ws.close(None).await;
                    return ConnectedExit::Ended;
                }
            },

            _ = heartbeat.tick() => {
                if ping_sent_at.is_none() {
                    if ws.send(Message::Text(encode(&Envelope::ping()))).await.is_err() {
                        return ConnectedExit::Lost;
                    }
                    ping_sent_at = Some(Instant::now());
                }
            },

            _ = pong_deadline => {
                warn!("Heartbeat timed out, forcing reconnect");
                let _ = ws.close(None).await;
                return ConnectedExit::Lost;
            },
        }
    }
}

/// Map a server envelope onto the event surface.
///
/// Events are delivered with `try_send`: a consumer that cannot keep up
/// loses room traffic rather than stalling the driver. Connection state
/// changes bypass this and are always delivered.
fn deliver(events: &mpsc::Sender<ClientEvent>, envelope: Envelope) {
    let event = match envelope {
        Envelope::RoomJoined {
            room_code,
            username,
        } => ClientEvent::Joined {
            room_code,
            username,
        },
        Envelope::ChatMessage {
            id,
            username,
            content,
            timestamp,
        } => ClientEvent::Message {
            id,
            username,
            content,
            timestamp,
        },
        Envelope::UserList { users } => ClientEvent::UserList(users),
        Envelope::UserJoined {
            username,
            timestamp,
        } => ClientEvent::UserJoined {
            username,
            timestamp,
        },
        Envelope::UserLeft {
            username,
            timestamp,
        } => ClientEvent::UserLeft {
            username,
            timestamp,
        },
        Envelope::Typing {
            username,
            is_typing,
            ..
        } => ClientEvent::Typing {
            username,
            is_typing,
        },
        Envelope::Error { message, .. } => ClientEvent::Notice { message },
        // join_room / ping / pong never reach here.
        _ => return,
    };

    if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
        warn!(?event, "Event channel full, dropping");
    }
}

enum ReconnectOutcome {
    Connected(WsStream),
    GaveUp,
    Cancelled,
}

/// Exponential-backoff reconnect loop, re-joining with the remembered
/// room and name. Commands other than leave are discarded while offline.
async fn reconnect(
    config: &ClientConfig,
    room_code: &str,
    display_name: &str,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> ReconnectOutcome {
    for attempt in 1..=config.reconnect_budget {
        let delay = backoff::delay_for_attempt(config, attempt);
        info!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect attempt");

        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Leave) | None => return ReconnectOutcome::Cancelled,
                    Some(_) => {}
                },
            }
        }

        match establish(config, room_code, display_name).await {
            Ok(ws) => {
                info!(attempt, "Reconnected");
                return ReconnectOutcome::Connected(ws);
            }
            Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
        }
    }
    warn!(
        budget = config.reconnect_budget,
        "Reconnect budget exhausted, entering simulation"
    );
    ReconnectOutcome::GaveUp
}

/// Offline mode: fabricate room traffic locally until told to leave.
async fn run_simulation(
    config: &ClientConfig,
    room_code: &str,
    display_name: &str,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<ClientEvent>,
) {
    info!(room = %room_code, "Entering simulation fallback");
    let _ = events
        .send(ClientEvent::Connection(ConnectionState::SimulationFallback))
        .await;
    let _ = events
        .send(ClientEvent::Joined {
            room_code: room_code.to_string(),
            username: display_name.to_string(),
        })
        .await;

    let mut sim = Simulation::new(display_name);
    let _ = events.send(ClientEvent::UserList(sim.roster())).await;

    let mut next_at = Instant::now() + sim.next_delay(config);
    loop {
        tokio::select! {
            _ = sleep_until(next_at) => {
                match sim.next_event() {
                    SimEvent::MemberJoined(username) => {
                        deliver_sim(events, ClientEvent::UserJoined {
                            username,
                            timestamp: now_millis(),
                        });
                        deliver_sim(events, ClientEvent::UserList(sim.roster()));
                    }
                    SimEvent::Chat { username, content } => {
                        deliver_sim(events, ClientEvent::Message {
                            id: new_message_id(),
                            username,
                            content,
                            timestamp: now_millis(),
                        });
                    }
                }
                next_at = Instant::now() + sim.next_delay(config);
            },

            cmd = cmd_rx.recv() => match cmd {
                Some(Command::SendChat(content)) => {
                    // Local echo, same shape as a live broadcast.
                    deliver_sim(events, ClientEvent::Message {
                        id: new_message_id(),
                        username: display_name.to_string(),
                        content,
                        timestamp: now_millis(),
                    });
                }
                Some(Command::SetTyping(_)) => {}
                Some(Command::Leave) | None => {
                    let _ = events
                        .send(ClientEvent::Connection(ConnectionState::Disconnected))
                        .await;
                    return;
                }
            },
        }
    }
}

fn deliver_sim(events: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
        warn!(?event, "Event channel full, dropping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_validates_inputs_before_spawning() {
        let config = ClientConfig::new("ws://127.0.0.1:1");
        assert!(matches!(
            RoomClient::join(config.clone(), "bad", "Alice"),
            Err(ClientError::Invalid(_))
        ));
        assert!(matches!(
            RoomClient::join(config, "AB12CD", "@@@"),
            Err(ClientError::Invalid(_))
        ));
    }

    #[test]
    fn random_room_codes_are_valid() {
        for _ in 0..50 {
            let code = random_room_code();
            assert_eq!(normalize_room_code(&code).as_deref(), Ok(code.as_str()));
        }
    }
}
