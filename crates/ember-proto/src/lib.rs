//! Wire protocol for the Ember room chat system.
//!
//! Every message on the wire is a single JSON object with a `type` tag,
//! modeled here as the [`Envelope`] enum. The same crate is used by the
//! server, the client connection manager, and the test harnesses, so both
//! sides agree on field names, validation rules, and timestamp format.
//!
//! Timestamps are Unix epoch milliseconds. Message ids are opaque strings;
//! [`new_message_id`] mints UUID v4 ids.

mod codec;
mod envelope;
mod validate;

pub use codec::{decode, encode, ProtoError, MAX_FRAME_BYTES};
pub use envelope::{new_message_id, now_millis, Envelope};
pub use validate::{
    normalize_room_code, trim_content, validate_display_name, ValidateError,
    MAX_DISPLAY_NAME_LEN, ROOM_CODE_LEN,
};
