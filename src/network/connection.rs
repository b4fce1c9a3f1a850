//! Connection - one task per accepted WebSocket.
//!
//! The loop multiplexes two sources: inbound frames from the transport
//! (dispatched to the router) and the session's outbound queue (written to
//! the transport). The task holds only the session id and the queue
//! receiver - the store owns the session - so eviction is observed as the
//! queue closing, and the transport is then shut with a non-normal close
//! code.

use crate::router::{DisconnectReason, Router};
use crate::state::SessionId;
use ember_proto::{encode, Envelope};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Close code sent when the server force-closes an evicted session.
/// Deliberately non-normal so reconnecting clients treat it as a failure.
const EVICTION_CLOSE_CODE: u16 = 4000;

pub struct Connection {
    sid: SessionId,
    addr: SocketAddr,
    router: Router,
    ws: WebSocketStream<TcpStream>,
    rx: mpsc::Receiver<Arc<Envelope>>,
}

impl Connection {
    pub fn new(
        sid: SessionId,
        addr: SocketAddr,
        router: Router,
        ws: WebSocketStream<TcpStream>,
        rx: mpsc::Receiver<Arc<Envelope>>,
    ) -> Self {
        Self {
            sid,
            addr,
            router,
            ws,
            rx,
        }
    }

    /// Run the connection until the transport closes or the session is
    /// evicted.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            sid,
            addr,
            router,
            mut ws,
            mut rx,
        } = self;

        let mut reason = DisconnectReason::ClientClosed;
        loop {
            tokio::select! {
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        router.handle_frame(&sid, &text).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if ws.send(Message::Pong(payload)).await.is_err() {
                            reason = DisconnectReason::TransportError;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary and stray control frames are ignored
                    Some(Err(e)) => {
                        debug!(sid = %sid, addr = %addr, error = %e, "Transport error");
                        reason = DisconnectReason::TransportError;
                        break;
                    }
                },

                queued = rx.recv() => match queued {
                    Some(envelope) => {
                        if ws.send(Message::Text(encode(envelope.as_ref()))).await.is_err() {
                            reason = DisconnectReason::TransportError;
                            break;
                        }
                    }
                    None => {
                        // Evicted: the store dropped our sender. Leave
                        // processing already ran; just close the transport.
                        let _ = ws
                            .close(Some(CloseFrame {
                                code: CloseCode::Library(EVICTION_CLOSE_CODE),
                                reason: "liveness timeout".into(),
                            }))
                            .await;
                        return Ok(());
                    }
                },
            }
        }

        router.handle_disconnect(&sid, reason).await;
        Ok(())
    }
}
