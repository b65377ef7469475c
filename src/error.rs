//! Error taxonomy for the integration layer.
//!
//! # Propagation Policy
//! - Validation and security errors are never retried
//! - Only transient network-class errors are retried (bounded)
//! - Callers surface `reason_code()` and a sanitized message, never raw detail

use std::time::Duration;
use thiserror::Error;

use crate::platform::Platform;

/// Errors produced by the platform integration layer.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Outbound target rejected by the SSRF guard.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Credential fields failed schema validation. Nothing was persisted.
    #[error("credential validation failed: {}", .0.join("; "))]
    CredentialValidation(Vec<String>),

    /// No credentials are stored for the platform.
    #[error("no credentials stored for {0}")]
    MissingCredentials(Platform),

    /// The circuit for a service is open; no request was attempted.
    #[error("circuit open for {service}, retry after {}s", retry_after.as_secs())]
    CircuitOpen { service: String, retry_after: Duration },

    /// The platform rejected the supplied credentials.
    #[error("authentication rejected by {platform}: {reason}")]
    Authentication { platform: Platform, reason: String },

    /// Local or platform-signaled rate limit.
    #[error("rate limit exceeded for {platform}")]
    RateLimitExceeded {
        platform: Platform,
        retry_after: Option<Duration>,
    },

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded its deadline.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Platform answered with an application-level error.
    #[error("{platform} returned {status} ({code}): {message}")]
    Api {
        platform: Platform,
        status: u16,
        code: String,
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("failed to decode {platform} response: {message}")]
    Decode { platform: Platform, message: String },

    /// Unknown platform identifier.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Encryption or decryption failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Credential store I/O failure.
    #[error("credential store error: {0}")]
    Store(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Stable machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            GatewayError::InvalidTarget(_) => "invalid_target",
            GatewayError::CredentialValidation(_) => "credential_validation",
            GatewayError::MissingCredentials(_) => "missing_credentials",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::Authentication { .. } => "authentication_failed",
            GatewayError::RateLimitExceeded { .. } => "rate_limited",
            GatewayError::Network(_) => "network_error",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Api { .. } => "platform_error",
            GatewayError::Decode { .. } => "decode_error",
            GatewayError::UnsupportedPlatform(_) => "unsupported_platform",
            GatewayError::Crypto(_) => "crypto_error",
            GatewayError::Store(_) => "store_error",
        }
    }

    /// Whether the retry loop may attempt the call again.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout(_) => true,
            GatewayError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the outcome counts as a failure for the circuit breaker.
    ///
    /// Errors where the remote service answered coherently (auth rejection,
    /// 4xx, decode problems) mean the service is up.
    pub fn trips_circuit(&self) -> bool {
        self.is_retryable()
    }

    /// Message safe for logs and API responses.
    pub fn sanitized_message(&self) -> String {
        match self {
            GatewayError::Authentication { platform, .. } => {
                format!("authentication rejected by {platform}")
            }
            GatewayError::Crypto(_) => "credential decryption failed".to_string(),
            GatewayError::Api {
                platform, status, code, ..
            } => format!("{platform} returned {status} ({code})"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(GatewayError::Network("reset".into()).is_retryable());
        assert!(GatewayError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(GatewayError::Api {
            platform: Platform::Shopee,
            status: 503,
            code: "unavailable".into(),
            message: String::new(),
        }
        .is_retryable());
        assert!(!GatewayError::Api {
            platform: Platform::Shopee,
            status: 400,
            code: "bad_request".into(),
            message: String::new(),
        }
        .is_retryable());
        assert!(!GatewayError::InvalidTarget("http://x".into()).is_retryable());
        assert!(!GatewayError::Authentication {
            platform: Platform::Lazada,
            reason: "expired".into(),
        }
        .trips_circuit());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::CredentialValidation(vec![
            "partner_id is required".into(),
            "shop_id must be numeric".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "credential validation failed: partner_id is required; shop_id must be numeric"
        );

        let err = GatewayError::CircuitOpen {
            service: "shopee".into(),
            retry_after: Duration::from_secs(42),
        };
        assert!(err.to_string().contains("retry after 42s"));
        assert_eq!(err.reason_code(), "circuit_open");
    }

    #[test]
    fn test_sanitized_message_hides_platform_detail() {
        let err = GatewayError::Authentication {
            platform: Platform::Tiktok,
            reason: "token abc123 expired".into(),
        };
        assert!(!err.sanitized_message().contains("abc123"));
    }
}
