//! Configuration types for the failover engine.
//!
//! All tunables are explicit and passed at construction. Tests that need a
//! different retry shape build a differently-configured executor rather than
//! flipping process-wide state.

use crate::types::{ConnectionType, RegionSwitchHint};
use std::time::Duration;

/// Consistency level of the account, as far as retry behavior cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLevel {
    /// Bounds in-region gone retries by a wall-clock budget.
    Strong,
    Session,
    Eventual,
}

/// Top-level configuration for the request executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Connection mode used for data-plane attempts.
    pub connection_type: ConnectionType,

    /// Overall per-operation deadline. On expiry the last observed error is
    /// surfaced with the full trace.
    pub request_timeout: Duration,

    /// Account consistency level.
    pub consistency: ConsistencyLevel,

    /// Retry policy tunables.
    pub retry: RetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Direct,
            request_timeout: Duration::from_secs(30),
            consistency: ConsistencyLevel::Session,
            retry: RetryConfig::default(),
        }
    }
}

impl ExecutorConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection mode.
    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    /// Set the per-operation deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the account consistency level.
    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    /// Set the retry configuration.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Tunables for the retry policy chain.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Whether same-tier retries stay local or jump to the next region.
    pub region_switch_hint: RegionSwitchHint,

    /// Fixed wait between session-not-available retries.
    pub session_retry_wait: Duration,

    /// Local retries per region for 404/1002 under `LocalRegionPreferred`.
    pub session_local_retries: u32,

    /// Local attempts for 404/1002 under `RemoteRegionPreferred` before the
    /// policy switches region.
    pub session_remote_preferred_local_retries: u32,

    /// Replica count per partition; bounds same-region gone retries, since
    /// each retry targets an alternate replica.
    pub replicas_per_partition: u32,

    /// Wall-clock budget for in-region gone retries on strong-consistency
    /// accounts before converting to 503 and escalating cross-region.
    pub in_region_gone_budget: Duration,

    /// Retries for failed metadata calls before the region is marked
    /// unavailable (3 retries means up to 4 total tries).
    pub metadata_retry_limit: u32,

    /// Wait between metadata call retries.
    pub metadata_retry_wait: Duration,

    /// Maximum 429 retries before surfacing the throttle.
    pub throttle_max_retries: u32,

    /// Base backoff for 429 retries when the server suggests none.
    pub throttle_base_delay: Duration,

    /// Cap on the exponentially grown throttle backoff.
    pub throttle_max_delay: Duration,

    /// Maximum immediate retries for 449 concurrency conflicts.
    pub retry_with_max_retries: u32,

    /// Cross-region retries granted to explicitly idempotent writes on
    /// otherwise non-retriable 500s.
    pub idempotent_write_cross_region_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            region_switch_hint: RegionSwitchHint::LocalRegionPreferred,
            session_retry_wait: Duration::from_millis(5),
            session_local_retries: 3,
            session_remote_preferred_local_retries: 1,
            replicas_per_partition: 4,
            in_region_gone_budget: Duration::from_secs(60),
            metadata_retry_limit: 3,
            metadata_retry_wait: Duration::from_millis(50),
            throttle_max_retries: 9,
            throttle_base_delay: Duration::from_millis(100),
            throttle_max_delay: Duration::from_secs(5),
            retry_with_max_retries: 3,
            idempotent_write_cross_region_retries: 1,
        }
    }
}

impl RetryConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the region switch hint.
    pub fn with_region_switch_hint(mut self, hint: RegionSwitchHint) -> Self {
        self.region_switch_hint = hint;
        self
    }

    /// Set the session-not-available inter-retry wait.
    pub fn with_session_retry_wait(mut self, wait: Duration) -> Self {
        self.session_retry_wait = wait;
        self
    }

    /// Set local retry count for 404/1002 under `LocalRegionPreferred`.
    pub fn with_session_local_retries(mut self, retries: u32) -> Self {
        self.session_local_retries = retries;
        self
    }

    /// Set local attempt count for 404/1002 under `RemoteRegionPreferred`.
    pub fn with_session_remote_preferred_local_retries(mut self, retries: u32) -> Self {
        self.session_remote_preferred_local_retries = retries;
        self
    }

    /// Set the replica count per partition.
    pub fn with_replicas_per_partition(mut self, replicas: u32) -> Self {
        self.replicas_per_partition = replicas;
        self
    }

    /// Set the strong-consistency in-region gone budget.
    pub fn with_in_region_gone_budget(mut self, budget: Duration) -> Self {
        self.in_region_gone_budget = budget;
        self
    }

    /// Set the metadata retry limit.
    pub fn with_metadata_retry_limit(mut self, limit: u32) -> Self {
        self.metadata_retry_limit = limit;
        self
    }

    /// Set the wait between metadata retries.
    pub fn with_metadata_retry_wait(mut self, wait: Duration) -> Self {
        self.metadata_retry_wait = wait;
        self
    }

    /// Set the maximum throttle retries.
    pub fn with_throttle_max_retries(mut self, retries: u32) -> Self {
        self.throttle_max_retries = retries;
        self
    }

    /// Set the base throttle backoff.
    pub fn with_throttle_base_delay(mut self, delay: Duration) -> Self {
        self.throttle_base_delay = delay;
        self
    }
}

/// Tunables for region topology.
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// How long an unavailable region stays out of the candidate set before
    /// it may be contacted again.
    pub unavailable_cooldown: Duration,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            unavailable_cooldown: Duration::from_secs(30),
        }
    }
}

impl TopologyConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unavailability cooldown.
    pub fn with_unavailable_cooldown(mut self, cooldown: Duration) -> Self {
        self.unavailable_cooldown = cooldown;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RetryConfig::default();
        assert_eq!(config.session_local_retries, 3);
        assert_eq!(config.session_remote_preferred_local_retries, 1);
        assert_eq!(config.metadata_retry_limit, 3);
        assert!(config.throttle_base_delay < config.throttle_max_delay);
    }

    #[test]
    fn builder_methods_chain() {
        let config = ExecutorConfig::new()
            .with_connection_type(ConnectionType::Gateway)
            .with_request_timeout(Duration::from_secs(5))
            .with_retry_config(
                RetryConfig::new()
                    .with_region_switch_hint(RegionSwitchHint::RemoteRegionPreferred)
                    .with_session_local_retries(2),
            );
        assert_eq!(config.connection_type, ConnectionType::Gateway);
        assert_eq!(
            config.retry.region_switch_hint,
            RegionSwitchHint::RemoteRegionPreferred
        );
        assert_eq!(config.retry.session_local_retries, 2);
    }
}
