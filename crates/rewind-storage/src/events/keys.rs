//! Key layout of the event log
//!
//! ```text
//! events/{session_id}/{sequence: 8 bytes big-endian}
//! ```
//!
//! The suffix is fixed width so byte order equals numeric order.

use rewind_core::SessionId;

/// Prefix shared by every event key
pub const EVENTS_PREFIX: &[u8] = b"events/";

/// Width of the encoded sequence suffix
pub const SEQUENCE_LEN: usize = 8;

/// `events/{session_id}/`
pub fn session_prefix(session: &SessionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(EVENTS_PREFIX.len() + session.as_bytes().len() + 1);
    key.extend_from_slice(EVENTS_PREFIX);
    key.extend_from_slice(session.as_bytes());
    key.push(b'/');
    key
}

/// Full key of one log entry
pub fn event_key(session: &SessionId, sequence: u64) -> Vec<u8> {
    let mut key = session_prefix(session);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

/// Smallest and largest possible keys of a session, both inclusive
pub fn session_bounds(session: &SessionId) -> (Vec<u8>, Vec<u8>) {
    (event_key(session, 0), event_key(session, u64::MAX))
}

/// Decode the sequence of a key belonging to `session`
///
/// Returns `None` if the key does not have the session prefix or the suffix
/// is not exactly [`SEQUENCE_LEN`] bytes.
pub fn decode_sequence(session: &SessionId, key: &[u8]) -> Option<u64> {
    let prefix = session_prefix(session);
    let suffix = key.strip_prefix(prefix.as_slice())?;
    let bytes: [u8; SEQUENCE_LEN] = suffix.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
