//! Retry logic.
//!
//! # Responsibilities
//! - Retry transient failures (network, timeout, platform 5xx)
//! - Retry a platform 429 when its `Retry-After` fits the backoff maximum
//! - Space attempts with exponential backoff + jitter
//! - Bound the number of attempts
//!
//! # Design Decisions
//! - Validation, authentication and SSRF errors are never retried
//! - A 429 without a usable hint is returned at once; it never counts as
//!   a circuit failure either way
//! - Jittered backoff prevents thundering herd
//! - The whole retry loop runs inside one circuit permit, so exhausting
//!   retries counts as a single circuit failure

use std::future::Future;

use crate::config::RetryConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// Attempt budget and delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Backoff::from(config))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent. The operation receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> GatewayResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt = 1;
    loop {
        let e = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        let delay = match &e {
            _ if attempt >= policy.max_attempts => None,
            GatewayError::RateLimitExceeded {
                retry_after: Some(hint),
                ..
            } => policy.backoff.honor_hint(*hint),
            e if e.is_retryable() => Some(policy.backoff.delay(attempt)),
            _ => None,
        };
        let Some(delay) = delay else {
            if e.is_retryable() {
                tracing::warn!(target_service = %label, attempts = attempt, "Retries exhausted");
            }
            return Err(e);
        };

        tracing::warn!(
            target_service = %label,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason = e.reason_code(),
            "Transient failure, retrying"
        );
        metrics::record_retry(label);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
