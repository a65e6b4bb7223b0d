//! One-way token hashing.
//!
//! The raw bearer token presented at scan time is never stored or sent to
//! the ledger; both sides key passes by this digest instead.

use sha2::{Digest, Sha256};

/// Hash a raw scanned token into its stable hex lookup key.
///
/// Deterministic: the same token always yields the same digest. Returns
/// `None` for blank input so malformed scans fall through to "not found"
/// rather than producing a digest no pass can ever match intentionally.
pub fn hash_token(token: &str) -> Option<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digest = Sha256::digest(trimmed.as_bytes());
    Some(hex::encode(digest))
}
