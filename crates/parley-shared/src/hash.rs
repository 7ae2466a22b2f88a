//! Stable opaque-id derivation.
//!
//! Usernames and chatroom paths never appear directly as storage keys; every
//! directory key is the blake3 digest of the raw string. The digest is
//! unsalted so keys stay stable across process restarts.

/// Hash a username or room path into its storage-key form (lowercase hex).
pub fn hashed(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}
