//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Exponential delay schedule: `base * 2^(attempt-1)`, capped at `max`,
/// plus up to 10% jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 is immediate.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_range = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX) / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };
        capped + Duration::from_millis(jitter)
    }

    /// A platform `Retry-After` hint, if it fits within the schedule's
    /// maximum delay. Longer waits are left to the caller.
    pub fn honor_hint(&self, hint: Duration) -> Option<Duration> {
        (hint <= self.max).then_some(hint)
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000));
        assert_eq!(backoff.delay(0), Duration::ZERO);

        let b1 = backoff.delay(1).as_millis();
        assert!((100..110).contains(&b1));

        let b2 = backoff.delay(2).as_millis();
        assert!((200..220).contains(&b2));

        let capped = backoff.delay(10).as_millis();
        assert!((1000..1100).contains(&capped));
        assert!(backoff.delay(u32::MAX) >= Duration::from_millis(1000));
    }

    #[test]
    fn test_hint_honored_only_within_max() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(2));
        assert_eq!(backoff.honor_hint(Duration::from_secs(1)), Some(Duration::from_secs(1)));
        assert_eq!(backoff.honor_hint(Duration::from_secs(2)), Some(Duration::from_secs(2)));
        assert_eq!(backoff.honor_hint(Duration::from_secs(60)), None);
    }
}
