//! `E-Pass` Token Codec
//!
//! Turns raw scanned credentials into stable lookup keys and produces
//! short signed codes that a scanner can trust without a network
//! round-trip.
//!
//! ## Primitives
//!
//! - **Token hashing**: SHA-256 over the raw bearer token; the hex digest
//!   is the only form ever stored or transmitted to the ledger.
//! - **Signed codes**: HMAC-SHA256 over a short participant code using a
//!   rotatable server-held secret, truncated and hex-encoded. Verification
//!   is constant-time; a bad tag is indistinguishable from "not found".

pub mod code;
pub mod error;
pub mod token;

pub use code::{CodeSigner, MIN_SECRET_LEN};
pub use error::CodecError;
pub use token::hash_token;
