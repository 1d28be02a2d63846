//! Gone/transport policy: 410 handling.
//!
//! A 410 means the contacted replica is gone (server generated) or the
//! transport timed out and was wrapped as gone. Each same-region retry
//! invalidates the replica address cache and targets an alternate replica;
//! once alternates are exhausted the policy escalates to the next region.
//! Strong-consistency accounts additionally bound in-region retries by a
//! wall-clock budget, after which the error converts to 503 and escalates.

use crate::config::RetryConfig;
use crate::error::ServiceError;
use crate::retry::RetryDecision;
use std::time::Instant;

/// State machine for 410 outcomes within one logical operation.
#[derive(Debug)]
pub struct GonePolicy {
    /// Same-region attempts so far; each one targets an alternate replica.
    attempts_in_region: u32,
    /// Routing-map-stale refreshes so far in this region.
    stale_refreshes: u32,
    /// When the first gone was observed in the current region.
    first_gone_at: Option<Instant>,
}

impl GonePolicy {
    /// Create a fresh policy.
    pub fn new() -> Self {
        Self {
            attempts_in_region: 0,
            stale_refreshes: 0,
            first_gone_at: None,
        }
    }

    /// React to a 410 with server- or transport-generated substatus.
    pub fn on_gone(&mut self, config: &RetryConfig, strong_consistency: bool) -> RetryDecision {
        let started = *self.first_gone_at.get_or_insert_with(Instant::now);

        if strong_consistency && started.elapsed() >= config.in_region_gone_budget {
            // Budget blown: convert to a region-wide unavailability and move
            // on, preserving the conversion in the surfaced error.
            return RetryDecision::RetryNextRegion {
                delay: None,
                replace_error: Some(ServiceError::service_unavailable()),
            };
        }

        // One attempt per alternate replica; the primary was the first try.
        if self.attempts_in_region + 1 < config.replicas_per_partition {
            self.attempts_in_region += 1;
            RetryDecision::RetrySameRegion {
                delay: None,
                force_address_refresh: true,
            }
        } else {
            RetryDecision::RetryNextRegion {
                delay: None,
                replace_error: None,
            }
        }
    }

    /// React to a 410 whose substatus indicates a stale routing map
    /// (partition migrating or splitting): force a metadata refresh and
    /// retry in place, bounded like replica retries.
    pub fn on_routing_stale(&mut self, config: &RetryConfig) -> RetryDecision {
        if self.stale_refreshes < config.replicas_per_partition {
            self.stale_refreshes += 1;
            RetryDecision::RetrySameRegion {
                delay: None,
                force_address_refresh: true,
            }
        } else {
            RetryDecision::RetryNextRegion {
                delay: None,
                replace_error: None,
            }
        }
    }

    /// Reset in-region bookkeeping after a region switch.
    pub fn reset_region(&mut self) {
        self.attempts_in_region = 0;
        self.stale_refreshes = 0;
        self.first_gone_at = None;
    }
}

impl Default for GonePolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retries_alternate_replicas_then_switches() {
        let config = RetryConfig::default().with_replicas_per_partition(3);
        let mut policy = GonePolicy::new();

        // Primary failed; two alternate replicas remain.
        for _ in 0..2 {
            assert_eq!(
                policy.on_gone(&config, false),
                RetryDecision::RetrySameRegion {
                    delay: None,
                    force_address_refresh: true,
                }
            );
        }
        assert_eq!(
            policy.on_gone(&config, false),
            RetryDecision::RetryNextRegion {
                delay: None,
                replace_error: None,
            }
        );
    }

    #[test]
    fn strong_consistency_budget_converts_to_service_unavailable() {
        let config = RetryConfig::default()
            .with_replicas_per_partition(100)
            .with_in_region_gone_budget(Duration::from_millis(1));
        let mut policy = GonePolicy::new();

        assert!(matches!(
            policy.on_gone(&config, true),
            RetryDecision::RetrySameRegion { .. }
        ));
        std::thread::sleep(Duration::from_millis(5));
        match policy.on_gone(&config, true) {
            RetryDecision::RetryNextRegion {
                replace_error: Some(err),
                ..
            } => {
                assert_eq!(err.status, crate::types::status::SERVICE_UNAVAILABLE);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn eventual_consistency_ignores_budget() {
        let config = RetryConfig::default()
            .with_replicas_per_partition(4)
            .with_in_region_gone_budget(Duration::ZERO);
        let mut policy = GonePolicy::new();
        // Budget elapsed immediately, but only strong consistency honors it.
        assert!(matches!(
            policy.on_gone(&config, false),
            RetryDecision::RetrySameRegion { .. }
        ));
    }

    #[test]
    fn routing_stale_forces_refresh() {
        let config = RetryConfig::default();
        let mut policy = GonePolicy::new();
        assert_eq!(
            policy.on_routing_stale(&config),
            RetryDecision::RetrySameRegion {
                delay: None,
                force_address_refresh: true,
            }
        );
    }

    #[test]
    fn region_switch_resets_replica_budget() {
        let config = RetryConfig::default().with_replicas_per_partition(2);
        let mut policy = GonePolicy::new();
        assert!(matches!(
            policy.on_gone(&config, false),
            RetryDecision::RetrySameRegion { .. }
        ));
        assert!(matches!(
            policy.on_gone(&config, false),
            RetryDecision::RetryNextRegion { .. }
        ));
        policy.reset_region();
        assert!(matches!(
            policy.on_gone(&config, false),
            RetryDecision::RetrySameRegion { .. }
        ));
    }
}
