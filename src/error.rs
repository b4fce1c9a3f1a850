//! Unified error handling for emberd.
//!
//! Every error in this taxonomy is non-fatal to the process: invalid input
//! and protocol errors are reported to the originating participant only,
//! and transport failures just drive the disconnect path for that one
//! session.

use ember_proto::{Envelope, ValidateError};
use thiserror::Error;

/// Errors from room registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Invalid(#[from] ValidateError),

    #[error("you are not in a room")]
    NotInRoom,

    #[error("message is empty")]
    EmptyContent,
}

impl RegistryError {
    /// Static error code for log fields and metric labels.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid(ValidateError::BadRoomCode) => "bad_room_code",
            Self::Invalid(ValidateError::BadDisplayName) => "bad_display_name",
            Self::NotInRoom => "not_in_room",
            Self::EmptyContent => "empty_content",
        }
    }

    /// Convert to a wire `error` envelope for the originating participant.
    pub fn to_wire(&self) -> Envelope {
        Envelope::error_notice(self.to_string())
    }
}
