//! Authenticated encryption for credential values.
//!
//! Ciphertext layout is `base64(nonce || ciphertext || tag)` with a fresh
//! 96-bit nonce per value. The associated data binds each value to its
//! platform and field name.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use crate::error::{GatewayError, GatewayResult};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Process-wide credential cipher. Immutable once constructed.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialCipher([REDACTED])")
    }
}

impl CredentialCipher {
    pub fn new(key: &[u8]) -> GatewayResult<Self> {
        if key.len() != KEY_LEN {
            return Err(GatewayError::Crypto(format!(
                "encryption key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| GatewayError::Crypto("invalid encryption key".to_string()))?;
        Ok(Self { cipher })
    }

    /// Build from a base64-encoded key.
    pub fn from_base64_key(encoded: &str) -> GatewayResult<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| GatewayError::Crypto("encryption key is not valid base64".to_string()))?;
        Self::new(&key)
    }

    /// Load the key from an environment variable.
    pub fn from_env(var: &str) -> GatewayResult<Self> {
        let encoded = std::env::var(var)
            .map_err(|_| GatewayError::Crypto(format!("{var} is not set")))?;
        Self::from_base64_key(&encoded)
    }

    /// Fresh random key, base64-encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        STANDARD.encode(key)
    }

    pub fn encrypt(&self, plaintext: &str, aad: &str) -> GatewayResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| GatewayError::Crypto("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str, aad: &str) -> GatewayResult<String> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|_| GatewayError::Crypto("ciphertext is not valid base64".to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(GatewayError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| GatewayError::Crypto("authentication tag mismatch".to_string()))?;
        String::from_utf8(plain)
            .map_err(|_| GatewayError::Crypto("plaintext is not UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let c = cipher();
        let sealed = c.encrypt("s3cret", "shopee:partner_key").unwrap();
        assert_ne!(sealed, "s3cret");
        assert_eq!(c.decrypt(&sealed, "shopee:partner_key").unwrap(), "s3cret");
    }

    #[test]
    fn test_nonce_is_fresh_per_value() {
        let c = cipher();
        let a = c.encrypt("same", "lazada:app_key").unwrap();
        let b = c.encrypt("same", "lazada:app_key").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_associated_data_binds_field() {
        let c = cipher();
        let sealed = c.encrypt("token", "tiktok:access_token").unwrap();
        let err = c.decrypt(&sealed, "tiktok:app_secret").unwrap_err();
        assert_eq!(err.reason_code(), "crypto_error");
    }

    #[test]
    fn test_tampering_detected() {
        let c = cipher();
        let sealed = c.encrypt("value", "shopify:api_key").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(c.decrypt(&STANDARD.encode(raw), "shopify:api_key").is_err());
    }

    #[test]
    fn test_wrong_key_and_bad_key_length() {
        let sealed = cipher().encrypt("value", "a:b").unwrap();
        assert!(cipher().decrypt(&sealed, "a:b").is_err());
        assert!(CredentialCipher::new(&[0u8; 16]).is_err());
        assert!(CredentialCipher::from_base64_key("not base64!").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        assert_eq!(format!("{:?}", cipher()), "CredentialCipher([REDACTED])");
    }
}
