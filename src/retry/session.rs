//! Read-session-not-available policy: 404/1002 handling.
//!
//! The contacted replica has not yet observed a write the client expects to
//! see. Retries stay in the region for a bounded number of attempts with a
//! fixed wait, then fail over; the region switch hint controls how many local
//! attempts are spent before switching. For writes the same bookkeeping
//! applies, but candidate resolution already restricts writes to writable
//! regions, so "local" means the single primary endpoint.

use crate::config::RetryConfig;
use crate::retry::RetryDecision;
use crate::types::RegionSwitchHint;

/// State machine for 404/1002 outcomes within one logical operation.
#[derive(Debug)]
pub struct SessionRetryPolicy {
    attempts_in_region: u32,
}

impl SessionRetryPolicy {
    /// Create a fresh policy.
    pub fn new() -> Self {
        Self {
            attempts_in_region: 0,
        }
    }

    /// React to a 404/1002.
    pub fn on_session_not_available(&mut self, config: &RetryConfig) -> RetryDecision {
        let local_budget = match config.region_switch_hint {
            RegionSwitchHint::LocalRegionPreferred => config.session_local_retries,
            RegionSwitchHint::RemoteRegionPreferred => {
                config.session_remote_preferred_local_retries
            }
        };

        if self.attempts_in_region < local_budget {
            self.attempts_in_region += 1;
            RetryDecision::RetrySameRegion {
                delay: Some(config.session_retry_wait),
                force_address_refresh: false,
            }
        } else {
            RetryDecision::RetryNextRegion {
                delay: None,
                replace_error: None,
            }
        }
    }

    /// Reset the local budget after a region switch.
    pub fn reset_region(&mut self) {
        self.attempts_in_region = 0;
    }
}

impl Default for SessionRetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
