//! MAC-signed bearer tokens for device authentication (spec.md §4.6
//! "Authentication"): `base64("<device_id>:<expiry_unix>:<hmac-hex>")` where
//! `hmac = HMAC-SHA-256(secret, "<device_id>:<expiry_unix>")`.

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime (spec.md scenario: 24h, matching the original sync
/// server's default).
pub const TOKEN_LIFETIME_SECS: i64 = 86_400;

fn sign(secret: &[u8], device_id: &str, expiry: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(format!("{device_id}:{expiry}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Issues a bearer token for `device_id`, valid for [`TOKEN_LIFETIME_SECS`].
/// Returns the token and its expiry as a Unix timestamp.
pub fn issue_token(secret: &[u8], device_id: &str) -> (String, i64) {
    let expiry = Utc::now().timestamp() + TOKEN_LIFETIME_SECS;
    let mac = sign(secret, device_id, expiry);
    let payload = format!("{device_id}:{expiry}:{mac}");
    (base64::engine::general_purpose::STANDARD.encode(payload), expiry)
}

/// Verifies a bearer token, returning the device ID iff the signature
/// matches and the token has not expired. Signature comparison is
/// constant-time (spec.md §4.6).
pub fn verify_token(secret: &[u8], token: &str) -> Option<String> {
    let decoded = base64::engine::general_purpose::STANDARD.decode(token).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    // device_id is everything up to the second-to-last ':', since device
    // IDs are caller-chosen strings and must not be assumed colon-free.
    let (rest, mac_hex) = decoded.rsplit_once(':')?;
    let (device_id, expiry_str) = rest.rsplit_once(':')?;
    let expiry: i64 = expiry_str.parse().ok()?;

    if Utc::now().timestamp() > expiry {
        return None;
    }

    let expected = sign(secret, device_id, expiry);
    let matches: bool = expected.as_bytes().ct_eq(mac_hex.as_bytes()).into();
    matches.then(|| device_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_valid_token() {
        let secret = b"test-secret";
        let (token, _expiry) = issue_token(secret, "tablet-07");
        assert_eq!(verify_token(secret, &token), Some("tablet-07".to_string()));
    }

    #[test]
    fn rejects_token_signed_with_different_secret() {
        let (token, _) = issue_token(b"secret-a", "tablet-07");
        assert_eq!(verify_token(b"secret-b", &token), None);
    }

    #[test]
    fn rejects_garbage_token() {
        assert_eq!(verify_token(b"secret", "not-base64!!!"), None);
    }

    #[test]
    fn rejects_expired_token() {
        let secret = b"test-secret";
        let expiry = Utc::now().timestamp() - 10;
        let mac = sign(secret, "tablet-07", expiry);
        let payload = format!("tablet-07:{expiry}:{mac}");
        let token = base64::engine::general_purpose::STANDARD.encode(payload);
        assert_eq!(verify_token(secret, &token), None);
    }
}
