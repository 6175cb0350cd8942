//! Cookie signing collaborator
//!
//! Signed cookie values have the form `value + "." + base64(hmac_sha256(value, secret))`
//! with the base64 padding stripped, the format produced by the `cookie-signature`
//! family of libraries. The session middleware verifies incoming cookies here
//! before handing them to [`crate::token`], and signs the cookies it issues.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a value. Returns `value.signature`.
pub fn sign(value: &str, secret: &str) -> String {
    format!("{}.{}", value, create_signature(value, secret))
}

/// Create HMAC-SHA256 signature in base64 format without padding
fn create_signature(value: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(value.as_bytes());
    STANDARD
        .encode(mac.finalize().into_bytes())
        .trim_end_matches('=')
        .to_string()
}

/// Verify a signed value and return the unsigned part.
///
/// The signature is everything after the last `.`; returns `None` when there is
/// no separator or the signature does not match.
pub fn unsign(signed_value: &str, secret: &str) -> Option<String> {
    let dot_pos = signed_value.rfind('.')?;
    let value = &signed_value[..dot_pos];
    let provided_signature = &signed_value[dot_pos + 1..];

    if constant_time_compare(&create_signature(value, secret), provided_signature) {
        Some(value.to_string())
    } else {
        None
    }
}

/// Try to unsign with multiple secrets (for secret rotation)
pub fn unsign_with_secrets(signed_value: &str, secrets: &[String]) -> Option<String> {
    secrets
        .iter()
        .find_map(|secret| unsign(signed_value, secret))
}

/// Constant-time string comparison
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

    #[test]
    fn test_sign_and_unsign() {
        let secret = "keyboard cat";
        let signed = sign("test-session-id", secret);
        assert!(signed.starts_with("test-session-id."));
        assert_eq!(unsign(&signed, secret), Some("test-session-id".to_string()));
    }

    #[test]
    fn test_invalid_signature() {
        let signed = sign("test-session-id", "keyboard cat");
        assert_eq!(unsign(&signed, "wrong secret"), None);
        assert_eq!(unsign("no-separator", "keyboard cat"), None);
    }

    #[test]
    fn test_known_vectors() {
        // Values produced by Node's cookie-signature with the same secrets.
        assert_eq!(
            sign("my session id", "secret"),
            "my session id.Jytwl6nuMV42lj6Ldd7aa4sboVs87ZnnCfYLCAm7OrU"
        );
        assert_eq!(
            sign("test_session_id", "super-secret-session-secret"),
            "test_session_id.IT8IProHCcbX10wxOHzIi5RXc65Lkxyd6t5HGWc93Xo"
        );
    }

    #[test]
    fn test_secret_rotation() {
        let signed = sign("session-id", "old-secret");
        let secrets = vec!["new-secret".to_string(), "old-secret".to_string()];
        assert_eq!(
            unsign_with_secrets(&signed, &secrets),
            Some("session-id".to_string())
        );
        assert_eq!(unsign_with_secrets(&signed, &secrets[..1]), None);
    }
}
