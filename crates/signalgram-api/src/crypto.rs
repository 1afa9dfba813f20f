//! HMAC-SHA256 webhook signature verification.
//!
//! Verifies that an inbound alert was produced by a holder of the shared
//! secret: the expected digest is computed over the raw body bytes and
//! compared to the caller-supplied signature in constant time. Malformed
//! input is a rejection, never a panic.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Result of signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// Whether the signature matched.
    pub is_valid: bool,
    /// Reason for failure, when invalid.
    pub error_message: Option<String>,
}

impl VerificationResult {
    /// Creates a successful verification result.
    pub fn valid() -> Self {
        Self { is_valid: true, error_message: None }
    }

    /// Creates a failed verification result with a reason.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self { is_valid: false, error_message: Some(message.into()) }
    }
}

/// Signature processing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature header missing or empty.
    MissingSignature,
    /// Signature is not a recognized format.
    InvalidFormat(String),
    /// Secret key unusable for HMAC.
    InvalidSecret,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "signature header missing"),
            Self::InvalidFormat(detail) => write!(f, "invalid signature format: {detail}"),
            Self::InvalidSecret => write!(f, "invalid secret key"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Verifies a webhook signature against the raw body and shared secret.
///
/// Accepts the raw 64-character hex digest or the `sha256=<hex>` prefixed
/// form. Returns a result, never an error: every malformed input maps to
/// an invalid verification with a reason.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> VerificationResult {
    if signature.is_empty() {
        return VerificationResult::invalid("signature header is empty");
    }

    if secret.is_empty() {
        return VerificationResult::invalid("shared secret is not configured");
    }

    let hex_signature = match parse_signature_format(signature) {
        Ok(hex) => hex,
        Err(err) => return VerificationResult::invalid(err.to_string()),
    };

    let expected = match sign(payload, secret) {
        Ok(sig) => sig,
        Err(err) => return VerificationResult::invalid(err.to_string()),
    };

    if timing_safe_eq(&hex_signature, &expected) {
        VerificationResult::valid()
    } else {
        VerificationResult::invalid("signature mismatch")
    }
}

/// Computes the HMAC-SHA256 digest of `payload` as lowercase hex.
///
/// This is the signing half of verification, used by senders, tests, and
/// tooling.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the key is rejected by the
/// HMAC implementation.
pub fn sign(payload: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;

    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Normalizes a supplied signature to raw hex.
///
/// Supported forms:
/// - `sha256=<hex>` (prefixed)
/// - `<hex>` (raw 64-character digest)
fn parse_signature_format(signature: &str) -> Result<String, SignatureError> {
    if let Some(hex) = signature.strip_prefix("sha256=") {
        return Ok(hex.to_string());
    }

    if signature.len() == 64 && signature.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(signature.to_string());
    }

    Err(SignatureError::InvalidFormat(
        "expected 'sha256=<hex>' or a raw 64-character hex digest".to_string(),
    ))
}

/// Constant-time string comparison.
///
/// Length mismatch short-circuits; equal-length comparison touches every
/// byte so no position information leaks through timing.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut acc = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret";
    const BODY: &[u8] = br#"{"ticker":"BTCUSDT","signal":"Buy","price":45000.0,"time":"2025-08-05T18:30:00Z"}"#;

    #[test]
    fn correctly_signed_body_verifies() {
        let signature = sign(BODY, SECRET).expect("sign");

        assert!(verify_signature(BODY, &signature, SECRET).is_valid);
        assert!(verify_signature(BODY, &format!("sha256={signature}"), SECRET).is_valid);
    }

    #[test]
    fn flipping_any_body_byte_fails_verification() {
        let signature = sign(BODY, SECRET).expect("sign");

        for i in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[i] ^= 0x01;
            assert!(
                !verify_signature(&tampered, &signature, SECRET).is_valid,
                "flip at byte {i} must invalidate the signature"
            );
        }
    }

    #[test]
    fn flipping_any_signature_nibble_fails_verification() {
        let signature = sign(BODY, SECRET).expect("sign");

        for i in 0..signature.len() {
            let mut tampered: Vec<char> = signature.chars().collect();
            tampered[i] = if tampered[i] == '0' { '1' } else { '0' };
            let tampered: String = tampered.into_iter().collect();
            assert!(
                !verify_signature(BODY, &tampered, SECRET).is_valid,
                "flip at hex digit {i} must invalidate the signature"
            );
        }
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signature = sign(BODY, SECRET).expect("sign");
        assert!(!verify_signature(BODY, &signature, "other_secret").is_valid);
    }

    #[test]
    fn empty_signature_rejected() {
        let result = verify_signature(BODY, "", SECRET);
        assert!(!result.is_valid);
        assert_eq!(result.error_message.as_deref(), Some("signature header is empty"));
    }

    #[test]
    fn empty_secret_rejected() {
        let signature = sign(BODY, SECRET).expect("sign");
        assert!(!verify_signature(BODY, &signature, "").is_valid);
    }

    #[test]
    fn malformed_signature_rejected_not_panicked() {
        for bad in ["not-hex", "zz", "sha1=abcdef", &"a".repeat(63)] {
            let result = verify_signature(BODY, bad, SECRET);
            assert!(!result.is_valid, "{bad} should be rejected");
        }
    }

    #[test]
    fn signing_is_deterministic() {
        let a = sign(BODY, SECRET).expect("sign");
        let b = sign(BODY, SECRET).expect("sign");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn timing_safe_eq_basic_cases() {
        assert!(timing_safe_eq("abc123", "abc123"));
        assert!(!timing_safe_eq("abc123", "abc124"));
        assert!(!timing_safe_eq("abc123", "abc1234"));
    }
}
