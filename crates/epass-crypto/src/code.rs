//! HMAC-signed participant codes.
//!
//! A participant code is a short human-presentable string (printed on a
//! badge, readable over the phone). The signed form `CODE.TAG` lets a
//! scanner that holds the rotatable secret trust a code offline; a device
//! that only saw the plaintext code cannot forge the tag.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CodecError;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Hex characters kept from the HMAC tag (16 bytes).
const TAG_HEX_LEN: usize = 32;

/// Signs and verifies participant codes with a shared rotatable secret.
#[derive(Clone)]
pub struct CodeSigner {
    secret: Vec<u8>,
}

impl CodeSigner {
    /// Create a signer from the raw secret bytes.
    pub fn new(secret: &[u8]) -> Result<Self, CodecError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CodecError::SecretTooShort {
                expected: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// Sign a participant code, producing the `CODE.TAG` wire form.
    ///
    /// Codes are normalized to uppercase before signing so badge printers
    /// and manual entry agree on case.
    pub fn sign(&self, code: &str) -> String {
        let code = code.trim().to_ascii_uppercase();
        let tag = self.tag_for(&code);
        format!("{code}.{tag}")
    }

    /// Verify a signed code, returning the plaintext code on success.
    ///
    /// Malformed input and a mismatched tag both return `None`; callers
    /// must not distinguish the two to the operator.
    pub fn verify(&self, signed: &str) -> Option<String> {
        let (code, tag) = signed.trim().rsplit_once('.')?;
        let code = code.to_ascii_uppercase();
        if code.is_empty() || tag.len() != TAG_HEX_LEN {
            return None;
        }
        let expected = self.tag_for(&code);
        if expected.as_bytes().ct_eq(tag.as_bytes()).into() {
            Some(code)
        } else {
            None
        }
    }

    fn tag_for(&self, code: &str) -> String {
        // Key length is unrestricted for HMAC; new_from_slice cannot fail.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(code.as_bytes());
        let tag = mac.finalize().into_bytes();
        hex::encode(&tag[..TAG_HEX_LEN / 2])
    }
}

impl std::fmt::Debug for CodeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never leak the secret through Debug output.
        f.debug_struct("CodeSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn signer() -> CodeSigner {
        CodeSigner::new(b"test-secret-0123456789abcdef").unwrap()
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let s = signer();
        let signed = s.sign("AB12CD");
        assert_eq!(s.verify(&signed).as_deref(), Some("AB12CD"));
    }

    #[test]
    fn signing_normalizes_case() {
        let s = signer();
        assert_eq!(s.sign("ab12cd"), s.sign("AB12CD"));
        let signed = s.sign("ab12cd");
        assert_eq!(s.verify(&signed).as_deref(), Some("AB12CD"));
    }

    #[test]
    fn tampered_code_is_invalid() {
        let s = signer();
        let signed = s.sign("AB12CD");
        let tampered = signed.replacen("AB12CD", "XY34ZW", 1);
        assert!(s.verify(&tampered).is_none());
    }

    #[test]
    fn tampered_tag_is_invalid() {
        let s = signer();
        let mut signed = s.sign("AB12CD");
        let last = signed.pop().unwrap();
        signed.push(if last == '0' { '1' } else { '0' });
        assert!(s.verify(&signed).is_none());
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let s1 = signer();
        let s2 = CodeSigner::new(b"another-secret-0123456789abc").unwrap();
        let signed = s1.sign("AB12CD");
        assert!(s2.verify(&signed).is_none());
    }

    #[test]
    fn malformed_input_is_invalid() {
        let s = signer();
        assert!(s.verify("").is_none());
        assert!(s.verify("no-separator").is_none());
        assert!(s.verify(".deadbeef").is_none());
        assert!(s.verify("CODE.shorttag").is_none());
    }

    #[test]
    fn short_secret_rejected() {
        assert!(matches!(
            CodeSigner::new(b"too-short"),
            Err(CodecError::SecretTooShort { .. })
        ));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let s = signer();
        let out = format!("{s:?}");
        assert!(!out.contains("test-secret"));
    }
}
