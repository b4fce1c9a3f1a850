//! Client-side errors.

use ember_proto::ValidateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Invalid(#[from] ValidateError),

    #[error("timed out waiting for the server")]
    Timeout,

    #[error("join rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("transport closed during handshake")]
    HandshakeClosed,

    #[error("client task is gone")]
    Closed,
}
