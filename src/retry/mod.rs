//! Retry policies: a per-operation chain of state machines mapping error
//! outcomes to retry directives.
//!
//! A chain is constructed fresh for every logical operation from an explicit
//! [`RetryConfig`]; there is no process-wide tunable state. Tests that need a
//! different retry shape build a differently-configured chain.

pub mod gone;
pub mod metadata;
pub mod session;
pub mod throttle;

pub use gone::GonePolicy;
pub use metadata::MetadataRetryPolicy;
pub use session::SessionRetryPolicy;
pub use throttle::ThrottlePolicy;

use crate::config::{ConsistencyLevel, RetryConfig};
use crate::error::ServiceError;
use crate::types::{status, sub_status, OperationDescriptor};
use std::time::Duration;

/// What the executor should do after an errored attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retry against the same region.
    RetrySameRegion {
        /// Wait before retrying.
        delay: Option<Duration>,
        /// Invalidate and re-resolve replica addresses first.
        force_address_refresh: bool,
    },
    /// Move to the next candidate region.
    RetryNextRegion {
        /// Wait before retrying.
        delay: Option<Duration>,
        /// Error to surface instead of the observed one if this was the last
        /// region (e.g. gone-budget exhaustion converting to 503).
        replace_error: Option<ServiceError>,
    },
    /// Mark the current region unavailable for its cooldown, then move on.
    MarkUnavailableAndSwitch,
    /// Surface the error to the caller.
    Fail,
}

/// Composable per-operation retry chain.
///
/// Holds one state machine per error family; each is consulted by
/// status/substatus and owns its own attempt bookkeeping.
#[derive(Debug)]
pub struct RetryPolicyChain {
    config: RetryConfig,
    strong_consistency: bool,
    multi_region: bool,
    gone: GonePolicy,
    session: SessionRetryPolicy,
    metadata: MetadataRetryPolicy,
    throttle: ThrottlePolicy,
    retry_with_attempts: u32,
    idempotent_cross_region_used: u32,
}

impl RetryPolicyChain {
    /// Create a chain for one logical operation.
    pub fn new(config: RetryConfig, consistency: ConsistencyLevel, multi_region: bool) -> Self {
        Self {
            strong_consistency: consistency == ConsistencyLevel::Strong,
            multi_region,
            gone: GonePolicy::new(),
            session: SessionRetryPolicy::new(),
            metadata: MetadataRetryPolicy::new(),
            throttle: ThrottlePolicy::new(),
            retry_with_attempts: 0,
            idempotent_cross_region_used: 0,
            config,
        }
    }

    /// Decide how to react to a data-plane error.
    pub fn decide(&mut self, op: &OperationDescriptor, err: &ServiceError) -> RetryDecision {
        let decision = match (err.status, err.sub_status) {
            (status::GONE, sub_status::PARTITION_IS_MIGRATING)
            | (status::GONE, sub_status::PARTITION_IS_SPLITTING) => {
                self.gone.on_routing_stale(&self.config)
            }
            (status::GONE, _) => {
                self.gone
                    .on_gone(&self.config, self.strong_consistency)
            }
            (status::NOT_FOUND, sub_status::READ_SESSION_NOT_AVAILABLE) => {
                self.session.on_session_not_available(&self.config)
            }
            (status::SERVICE_UNAVAILABLE, _) => {
                // Cross-region retry only makes sense on multi-region accounts.
                if self.multi_region {
                    RetryDecision::RetryNextRegion {
                        delay: None,
                        replace_error: None,
                    }
                } else {
                    RetryDecision::Fail
                }
            }
            (status::TOO_MANY_REQUESTS, _) => self.throttle.on_throttled(&self.config, err),
            (status::RETRY_WITH, _) => {
                if self.retry_with_attempts < self.config.retry_with_max_retries {
                    self.retry_with_attempts += 1;
                    RetryDecision::RetrySameRegion {
                        delay: None,
                        force_address_refresh: false,
                    }
                } else {
                    RetryDecision::Fail
                }
            }
            (status::INTERNAL_SERVER_ERROR, _) => {
                // Plain 500s surface immediately; the narrow exception is an
                // explicitly idempotent write on a multi-region account.
                if op.is_write()
                    && op.idempotent
                    && self.multi_region
                    && self.idempotent_cross_region_used
                        < self.config.idempotent_write_cross_region_retries
                {
                    self.idempotent_cross_region_used += 1;
                    RetryDecision::RetryNextRegion {
                        delay: None,
                        replace_error: None,
                    }
                } else {
                    RetryDecision::Fail
                }
            }
            _ => RetryDecision::Fail,
        };
        tracing::debug!(
            status = err.status,
            sub_status = err.sub_status,
            ?decision,
            "retry decision"
        );
        decision
    }

    /// Decide how to react to a failed metadata call (address refresh or
    /// partition key range lookup).
    pub fn decide_metadata(&mut self, err: &ServiceError) -> RetryDecision {
        let decision = self.metadata.on_metadata_failure(&self.config);
        tracing::debug!(
            status = err.status,
            sub_status = err.sub_status,
            ?decision,
            "metadata retry decision"
        );
        decision
    }

    /// Reset per-region state after a region switch. Local retry budgets and
    /// the in-region gone bookkeeping start over in the new region.
    pub fn on_region_switched(&mut self) {
        self.gone.reset_region();
        self.session.reset_region();
        self.metadata.reset_region();
    }
}
