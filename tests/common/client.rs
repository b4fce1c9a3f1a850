//! Test WebSocket client.
//!
//! Drives an emberd instance at the protocol level: sends raw or typed
//! envelopes and asserts on received ones.

use ember_proto::{decode, encode, Envelope};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// A test chat client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let (ws, _response) = connect_async(format!("ws://{}", address)).await?;
        Ok(Self { ws })
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, raw: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(raw.to_string())).await?;
        Ok(())
    }

    /// Send an envelope.
    pub async fn send(&mut self, envelope: &Envelope) -> anyhow::Result<()> {
        self.send_raw(&encode(envelope)).await
    }

    /// Send a join request.
    pub async fn join(&mut self, room_code: &str, username: &str) -> anyhow::Result<()> {
        self.send(&Envelope::join_room(room_code, username)).await
    }

    /// Send a chat message with server-assigned id and timestamp.
    pub async fn chat(&mut self, content: &str) -> anyhow::Result<()> {
        self.send_raw(&format!(
            r#"{{"type":"chat_message","content":"{}"}}"#,
            content
        ))
        .await
    }

    /// Receive a single envelope from the server.
    pub async fn recv(&mut self) -> anyhow::Result<Envelope> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive an envelope with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Envelope> {
        loop {
            let frame = timeout(dur, self.ws.next())
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for a frame"))?;
            match frame {
                Some(Ok(Message::Text(text))) => {
                    return decode(&text).map_err(|e| anyhow::anyhow!("decode error: {}", e));
                }
                Some(Ok(Message::Close(_))) | None => {
                    anyhow::bail!("connection closed");
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => anyhow::bail!("transport error: {}", e),
            }
        }
    }

    /// Receive envelopes until the given predicate returns true.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<Envelope>>
    where
        F: FnMut(&Envelope) -> bool,
    {
        let mut envelopes = Vec::new();
        loop {
            let envelope = self.recv().await?;
            let done = predicate(&envelope);
            envelopes.push(envelope);
            if done {
                return Ok(envelopes);
            }
        }
    }

    /// Assert that nothing arrives within the window.
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_timeout(dur).await {
            Ok(envelope) => anyhow::bail!("expected silence, got {:?}", envelope),
            Err(e) if e.to_string().contains("timed out") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Close the connection cleanly.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
