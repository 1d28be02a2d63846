//! Throttling policy: 429 handling.
//!
//! Throttles retry against the same region after the server-suggested
//! backoff, or an exponentially grown default when none is suggested. The
//! policy never switches regions: throttling is a per-region quota signal,
//! not a region-health signal.

use crate::config::RetryConfig;
use crate::error::ServiceError;
use crate::retry::RetryDecision;

/// State machine for 429 outcomes within one logical operation.
#[derive(Debug)]
pub struct ThrottlePolicy {
    attempts: u32,
}

impl ThrottlePolicy {
    /// Create a fresh policy.
    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    /// React to a 429.
    pub fn on_throttled(&mut self, config: &RetryConfig, err: &ServiceError) -> RetryDecision {
        if self.attempts >= config.throttle_max_retries {
            return RetryDecision::Fail;
        }

        let backoff = err.retry_after.unwrap_or_else(|| {
            config
                .throttle_base_delay
                .saturating_mul(1u32 << self.attempts.min(16))
        });
        self.attempts += 1;

        RetryDecision::RetrySameRegion {
            delay: Some(backoff.min(config.throttle_max_delay)),
            force_address_refresh: false,
        }
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn honors_server_suggested_backoff() {
        let config = RetryConfig::default();
        let mut policy = ThrottlePolicy::new();
        let err = ServiceError::throttled().with_retry_after(Duration::from_millis(7));
        assert_eq!(
            policy.on_throttled(&config, &err),
            RetryDecision::RetrySameRegion {
                delay: Some(Duration::from_millis(7)),
                force_address_refresh: false,
            }
        );
    }

    #[test]
    fn default_backoff_grows_and_caps() {
        let config = RetryConfig::default()
            .with_throttle_base_delay(Duration::from_millis(10))
            .with_throttle_max_retries(10);
        let mut policy = ThrottlePolicy::new();
        let err = ServiceError::throttled();

        let mut delays = Vec::new();
        for _ in 0..10 {
            match policy.on_throttled(&config, &err) {
                RetryDecision::RetrySameRegion {
                    delay: Some(d), ..
                } => delays.push(d),
                other => panic!("unexpected decision: {other:?}"),
            }
        }
        assert_eq!(delays[0], Duration::from_millis(10));
        assert_eq!(delays[1], Duration::from_millis(20));
        assert!(delays.iter().all(|d| *d <= config.throttle_max_delay));
    }

    #[test]
    fn exhaustion_surfaces_the_throttle() {
        let config = RetryConfig::default().with_throttle_max_retries(2);
        let mut policy = ThrottlePolicy::new();
        let err = ServiceError::throttled();
        assert!(matches!(
            policy.on_throttled(&config, &err),
            RetryDecision::RetrySameRegion { .. }
        ));
        assert!(matches!(
            policy.on_throttled(&config, &err),
            RetryDecision::RetrySameRegion { .. }
        ));
        assert_eq!(policy.on_throttled(&config, &err), RetryDecision::Fail);
    }
}
