//! Gateway - TCP listener that accepts incoming WebSocket connections.
//!
//! The Gateway binds one socket and spawns a Connection task for each
//! accepted client after the WebSocket handshake (with Origin validation)
//! succeeds.

use crate::config::ListenConfig;
use crate::network::Connection;
use crate::router::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tracing::{error, info, warn};

/// The Gateway accepts incoming TCP connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    allow_origins: Vec<String>,
    router: Router,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(config: ListenConfig, router: Router) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self {
            listener,
            allow_origins: config.allow_origins,
            router,
        })
    }

    /// The address actually bound (tests bind port 0).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the gateway, accepting connections forever.
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let router = self.router.clone();
                    let allowed = self.allow_origins.clone();

                    tokio::spawn(async move {
                        // Origin validation callback for the WebSocket handshake.
                        let cors_callback =
                            |req: &http::Request<()>, response: http::Response<()>| {
                                // An empty allow-list admits all origins.
                                if allowed.is_empty() {
                                    return Ok(response);
                                }

                                if let Some(origin) =
                                    req.headers().get("Origin").and_then(|o| o.to_str().ok())
                                {
                                    if allowed.iter().any(|a| a == origin || a == "*") {
                                        return Ok(response);
                                    }
                                    warn!(%addr, origin = %origin, "WebSocket CORS rejected");
                                }

                                Err(http::Response::builder()
                                    .status(http::StatusCode::FORBIDDEN)
                                    .body(Some("origin not allowed".to_string()))
                                    .unwrap())
                            };

                        match accept_hdr_async(stream, cors_callback).await {
                            Ok(ws) => {
                                let (session, rx) = router.hub().store.create();
                                let sid = session.sid.clone();
                                // The store is the sole owner of the session.
                                drop(session);
                                crate::metrics::set_connected_sessions(router.hub().store.len());
                                info!(%sid, %addr, "WebSocket connection accepted");

                                let connection =
                                    Connection::new(sid.clone(), addr, router, ws, rx);
                                if let Err(e) = connection.run().await {
                                    error!(%sid, %addr, error = %e, "Connection error");
                                }
                                info!(%sid, %addr, "Connection closed");
                            }
                            Err(e) => {
                                warn!(%addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}
