//! Webhook signature verification.
//!
//! Inbound webhook calls are signed with HMAC-SHA256 over the raw request
//! body, hex-encoded (lowercase) in the `X-Signature` header. Verification
//! runs over the exact bytes as received, never a re-serialized payload.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a webhook signature.
///
/// `provided` is the hex digest taken from the signature header. Returns
/// `false` for a missing/empty secret, an empty digest, or a mismatch;
/// callers must treat all three identically so no cause is leaked.
pub fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    if secret.is_empty() || provided.is_empty() {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);

    let expected = hex::encode(mac.finalize().into_bytes());

    // Constant-time comparison to prevent timing attacks
    constant_time_compare(&expected, provided)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_verify_signature_valid() {
        let body = br#"{"message_id":"m1"}"#;
        let sig = digest("test-secret", body);
        assert!(verify_signature("test-secret", body, &sig));
    }

    #[test]
    fn test_verify_signature_mismatch() {
        let body = br#"{"message_id":"m1"}"#;
        let sig = digest("test-secret", body);
        assert!(!verify_signature("other-secret", body, &sig));
        assert!(!verify_signature("test-secret", b"tampered", &sig));
    }

    #[test]
    fn test_verify_signature_missing_inputs() {
        let body = br#"{"message_id":"m1"}"#;
        let sig = digest("test-secret", body);
        assert!(!verify_signature("", body, &sig));
        assert!(!verify_signature("test-secret", body, ""));
    }

    #[test]
    fn test_verify_signature_exact_bytes() {
        // A digest over re-serialized JSON must not pass for the raw bytes.
        let raw = br#"{ "message_id": "m1" }"#;
        let reserialized = br#"{"message_id":"m1"}"#;
        let sig = digest("test-secret", reserialized);
        assert!(!verify_signature("test-secret", raw, &sig));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
