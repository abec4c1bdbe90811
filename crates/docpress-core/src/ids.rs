//! Identifier generation.
//!
//! All entity ids are UUIDv7 rendered as strings. UUIDv7 embeds a Unix
//! timestamp, so ids sort chronologically, which keeps insertion order
//! recoverable from the id alone and helps log correlation.

use uuid::Uuid;

/// Generate a new time-ordered id.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Check whether a string is a well-formed UUID of any version.
pub fn is_valid_id(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}
