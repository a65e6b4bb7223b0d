//! Codec error types.

/// Errors from codec construction.
///
/// Hashing and verification themselves never fail into caller control
/// flow; malformed input is reported as an absent value instead.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Signing secret too short: expected at least {expected} bytes, got {actual}")]
    SecretTooShort { expected: usize, actual: usize },
}
