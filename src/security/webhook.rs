//! HMAC-SHA256 signing and webhook signature verification.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &[u8]) -> GatewayResult<HmacSha256> {
    HmacSha256::new_from_slice(secret)
        .map_err(|_| GatewayError::Crypto("invalid HMAC key".to_string()))
}

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(secret: &[u8], parts: &[&[u8]]) -> GatewayResult<Vec<u8>> {
    let mut mac = mac_for(secret)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Lowercase hex HMAC-SHA256 of a payload.
pub fn sign_payload(payload: &[u8], secret: &str) -> GatewayResult<String> {
    Ok(hex::encode(hmac_sha256(secret.as_bytes(), &[payload])?))
}

/// Verify a hex signature in constant time. Malformed input is a mismatch.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    verify_raw(payload, &expected, secret)
}

/// Verify a base64 signature in constant time.
pub fn verify_signature_base64(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    verify_raw(payload, &expected, secret)
}

fn verify_raw(payload: &[u8], expected: &[u8], secret: &str) -> bool {
    let Ok(mut mac) = mac_for(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(expected).is_ok()
}

/// Webhook verification gate honoring `webhooks.verify_signatures`.
#[derive(Debug, Clone, Copy)]
pub struct WebhookVerifier {
    enabled: bool,
}

impl WebhookVerifier {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            tracing::warn!("Webhook signature verification is disabled");
        }
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let payload = br#"{"order_sn":"220101ABC","status":"READY_TO_SHIP"}"#;
        let sig = sign_payload(payload, "webhook-secret").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(payload, &sig, "webhook-secret"));
        assert!(verify_signature(payload, &sig.to_uppercase(), "webhook-secret"));
    }

    #[test]
    fn test_mutated_payload_or_secret_fails() {
        let payload = b"payload";
        let sig = sign_payload(payload, "secret").unwrap();
        assert!(!verify_signature(b"payloaD", &sig, "secret"));
        assert!(!verify_signature(payload, &sig, "other"));
        assert!(!verify_signature(payload, "not-hex", "secret"));
        assert!(!verify_signature(payload, "", "secret"));
    }

    #[test]
    fn test_any_flipped_signature_bit_fails() {
        let payload = br#"{"order_id":"42","status":"SHIPPED"}"#;
        let raw = hmac_sha256(b"whsec", &[payload.as_slice()]).unwrap();
        assert!(verify_signature(payload, &hex::encode(&raw), "whsec"));
        assert!(verify_signature_base64(payload, &STANDARD.encode(&raw), "whsec"));

        for byte in 0..raw.len() {
            for bit in 0..8 {
                let mut flipped = raw.clone();
                flipped[byte] ^= 1 << bit;
                assert!(
                    !verify_signature(payload, &hex::encode(&flipped), "whsec"),
                    "hex byte {byte} bit {bit}"
                );
                assert!(
                    !verify_signature_base64(payload, &STANDARD.encode(&flipped), "whsec"),
                    "base64 byte {byte} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn test_truncated_or_extended_signature_fails() {
        let payload = b"payload";
        let raw = hmac_sha256(b"secret", &[payload.as_slice()]).unwrap();
        assert!(!verify_signature(payload, &hex::encode(&raw[..31]), "secret"));
        let mut extended = raw.clone();
        extended.push(0);
        assert!(!verify_signature_base64(payload, &STANDARD.encode(&extended), "secret"));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let sig = sign_payload(b"what do ya want for nothing?", "Jefe").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_base64_form() {
        let payload = b"{\"id\":1}";
        let raw = hmac_sha256(b"shpss", &[payload.as_slice()]).unwrap();
        let sig = STANDARD.encode(raw);
        assert!(verify_signature_base64(payload, &sig, "shpss"));
        assert!(!verify_signature(payload, &sig, "shpss"));
    }

    #[test]
    fn test_verifier_flag() {
        assert!(WebhookVerifier::new(true).enabled());
        assert!(!WebhookVerifier::new(false).enabled());
    }
}
