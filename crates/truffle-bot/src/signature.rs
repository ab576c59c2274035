use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Reject requests whose timestamp is further than this from now
/// (replay protection).
const MAX_CLOCK_SKEW_SECS: i64 = 60 * 5;

/// Compute the `v0=<hex>` signature over `v0:{timestamp}:{body}`.
pub fn sign(secret: &str, timestamp: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(format!("v0:{timestamp}:{body}").as_bytes());
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify an incoming event signature. `now_epoch` is passed in so the
/// freshness window is testable.
pub fn verify(
    secret: &str,
    timestamp: &str,
    body: &str,
    signature: &str,
    now_epoch: i64,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now_epoch - ts).abs() > MAX_CLOCK_SKEW_SECS {
        return false;
    }

    let expected = sign(secret, timestamp, body);
    // constant-time comparison via the hmac verifier
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(format!("v0:{timestamp}:{body}").as_bytes());
    match signature.strip_prefix("v0=").and_then(|s| hex::decode(s).ok()) {
        Some(bytes) => mac.verify_slice(&bytes).is_ok(),
        None => signature == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let body = r#"{"type":"event_callback"}"#;
        let sig = sign("secret", "1700000000", body);
        assert!(verify("secret", "1700000000", body, &sig, 1_700_000_010));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = sign("secret", "1700000000", "original");
        assert!(!verify("secret", "1700000000", "tampered", &sig, 1_700_000_010));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = sign("secret", "1700000000", "body");
        assert!(!verify("other", "1700000000", "body", &sig, 1_700_000_010));
    }

    #[test]
    fn stale_timestamp_fails() {
        let sig = sign("secret", "1700000000", "body");
        assert!(!verify("secret", "1700000000", "body", &sig, 1_700_009_999));
    }

    #[test]
    fn garbage_signature_fails() {
        assert!(!verify("secret", "1700000000", "body", "nope", 1_700_000_000));
        assert!(!verify("secret", "not-a-ts", "body", "v0=00", 1_700_000_000));
    }
}
