//! JSON (de)serialization for [`Envelope`].

use crate::envelope::Envelope;
use thiserror::Error;

/// Upper bound on a single wire frame. Anything larger is rejected before
/// JSON parsing is attempted.
pub const MAX_FRAME_BYTES: usize = 16 * 1024;

/// Codec errors. Neither variant is fatal to a connection: the server
/// reports them to the originator and keeps the transport open.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    FrameTooLarge,

    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode one wire frame into an [`Envelope`].
///
/// Unknown `type` tags and missing required fields both surface as
/// [`ProtoError::Malformed`].
pub fn decode(raw: &str) -> Result<Envelope, ProtoError> {
    if raw.len() > MAX_FRAME_BYTES {
        return Err(ProtoError::FrameTooLarge);
    }
    Ok(serde_json::from_str(raw)?)
}

/// Encode an [`Envelope`] as a wire frame.
pub fn encode(envelope: &Envelope) -> String {
    // Envelope contains only strings, integers, booleans and vectors of
    // strings; serialization cannot fail for such a type.
    serde_json::to_string(envelope).expect("envelope serialization is infallible")
}
