//! Participant-side connection manager for the Ember room chat system.
//!
//! [`RoomClient`] is a thin handle over a single background driver task
//! that owns the transport, the heartbeat and reconnect timers, and the
//! simulation fallback. Events are emitted on a bounded channel returned
//! from [`RoomClient::join`]; the consumer cannot tell whether an event
//! came from the network or from the local simulation.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::new("ws://127.0.0.1:8700");
//! let (client, mut events) = RoomClient::join(config, "AB12CD", "Alice")?;
//!
//! client.send_chat("hello")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ClientEvent::Message { username, content, .. } => { /* render */ }
//!         ClientEvent::Connection(ConnectionState::SimulationFallback) => { /* offline */ }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! # State machine
//!
//! ```text
//! Disconnected ──join()──▶ Connecting ──room_joined──▶ Connected
//!        ▲                     │                          │
//!        │              timeout/refused          abnormal close or
//!   leave()/normal             ▼                  heartbeat timeout
//!      close            SimulationFallback ◀── budget ── Reconnecting
//!                              ▲            exhausted        │
//!                              └──────────────────────◀──────┘
//! ```
//!
//! Simulation is terminal: once entered, the client never dials out again
//! for that session.

mod backoff;
mod config;
mod error;
mod event;
mod manager;
mod simulation;

pub use config::ClientConfig;
pub use error::ClientError;
pub use event::{ClientEvent, ConnectionState};
pub use manager::{random_room_code, RoomClient};
