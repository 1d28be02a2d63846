//! Metadata-call policy: address refresh and partition key range lookups.
//!
//! Connection failures and timeouts on metadata calls retry in place a small
//! bounded number of times. Exhaustion is treated as a region-down signal:
//! the region is marked unavailable for its cooldown and subsequent requests
//! redirect to the next preferred region without re-attempting it.

use crate::config::RetryConfig;
use crate::retry::RetryDecision;

/// State machine for metadata call failures within one logical operation.
#[derive(Debug)]
pub struct MetadataRetryPolicy {
    attempts: u32,
}

impl MetadataRetryPolicy {
    /// Create a fresh policy.
    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    /// React to a failed metadata call.
    pub fn on_metadata_failure(&mut self, config: &RetryConfig) -> RetryDecision {
        if self.attempts < config.metadata_retry_limit {
            self.attempts += 1;
            RetryDecision::RetrySameRegion {
                delay: Some(config.metadata_retry_wait),
                force_address_refresh: false,
            }
        } else {
            RetryDecision::MarkUnavailableAndSwitch
        }
    }

    /// Reset after a region switch.
    pub fn reset_region(&mut self) {
        self.attempts = 0;
    }
}

impl Default for MetadataRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_retries_then_region_down() {
        let config = RetryConfig::default().with_metadata_retry_limit(3);
        let mut policy = MetadataRetryPolicy::new();

        // 3 retries means up to 4 total tries before the region goes down.
        for _ in 0..3 {
            assert!(matches!(
                policy.on_metadata_failure(&config),
                RetryDecision::RetrySameRegion { .. }
            ));
        }
        assert_eq!(
            policy.on_metadata_failure(&config),
            RetryDecision::MarkUnavailableAndSwitch
        );
    }

    #[test]
    fn reset_restores_budget() {
        let config = RetryConfig::default().with_metadata_retry_limit(1);
        let mut policy = MetadataRetryPolicy::new();
        policy.on_metadata_failure(&config);
        assert_eq!(
            policy.on_metadata_failure(&config),
            RetryDecision::MarkUnavailableAndSwitch
        );
        policy.reset_region();
        assert!(matches!(
            policy.on_metadata_failure(&config),
            RetryDecision::RetrySameRegion { .. }
        ));
    }
}
