//! Input validation shared by server and client.
//!
//! Room codes and display names are validated at the protocol boundary so
//! a misbehaving client can never put unchecked strings into room state.

use thiserror::Error;

/// Room codes are exactly this many characters.
pub const ROOM_CODE_LEN: usize = 6;

/// Display names are at most this many characters after trimming.
pub const MAX_DISPLAY_NAME_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("room code must be exactly {ROOM_CODE_LEN} letters or digits")]
    BadRoomCode,

    #[error(
        "display name must be 1-{MAX_DISPLAY_NAME_LEN} letters, digits, spaces, hyphens or underscores"
    )]
    BadDisplayName,
}

/// Validate a room code and return its canonical (uppercase) form.
///
/// Input is case-insensitive; room state always stores uppercase.
pub fn normalize_room_code(raw: &str) -> Result<String, ValidateError> {
    let code = raw.trim();
    if code.len() != ROOM_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidateError::BadRoomCode);
    }
    Ok(code.to_ascii_uppercase())
}

/// Validate a display name and return its trimmed form.
pub fn validate_display_name(raw: &str) -> Result<String, ValidateError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ValidateError::BadDisplayName);
    }
    let allowed = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_');
    if !allowed {
        return Err(ValidateError::BadDisplayName);
    }
    Ok(name.to_string())
}

/// Trim chat content, returning `None` when nothing remains.
pub fn trim_content(raw: &str) -> Option<&str> {
    let content = raw.trim();
    if content.is_empty() { None } else { Some(content) }
}
