//! Fault-injection rules and their lifecycle bookkeeping.
//!
//! A rule's id, condition, and result are immutable after creation; only the
//! enabled flag, hit count, and hit-count details mutate, all of them safely
//! under concurrent operations.

use crate::fault::condition::FaultInjectionCondition;
use crate::fault::result::{FaultInjectionResult, TimesScope};
use crate::types::{OperationType, ResourceType};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-(operation, resource) hit counts for a rule.
pub type HitCountDetails = HashMap<(OperationType, ResourceType), u64>;

/// A declarative fault-injection rule.
pub struct FaultInjectionRule {
    id: String,
    condition: FaultInjectionCondition,
    result: FaultInjectionResult,
    /// Wall-clock validity window measured from activation.
    duration: Option<Duration>,
    /// Max total genuine injections.
    hit_limit: Option<u64>,

    // Mutable lifecycle state.
    enabled: AtomicBool,
    activated_at: Mutex<Option<Instant>>,
    hit_count: AtomicU64,
    /// Lifetime consumption of a cumulative `times` bound.
    times_consumed: AtomicU64,
    details: DashMap<(OperationType, ResourceType), u64>,
    /// Last connection-error firing per region, for interval gating.
    last_connection_fire: Mutex<HashMap<String, Instant>>,
}

impl FaultInjectionRule {
    /// Create a rule. It stays inactive until registered with a
    /// [`RuleEngine`](crate::fault::RuleEngine).
    pub fn new(
        id: impl Into<String>,
        condition: FaultInjectionCondition,
        result: FaultInjectionResult,
    ) -> Self {
        Self {
            id: id.into(),
            condition,
            result,
            duration: None,
            hit_limit: None,
            enabled: AtomicBool::new(false),
            activated_at: Mutex::new(None),
            hit_count: AtomicU64::new(0),
            times_consumed: AtomicU64::new(0),
            details: DashMap::new(),
            last_connection_fire: Mutex::new(HashMap::new()),
        }
    }

    /// Create a rule with a generated id.
    pub fn with_generated_id(
        condition: FaultInjectionCondition,
        result: FaultInjectionResult,
    ) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), condition, result)
    }

    /// Bound the rule's validity window, measured from activation.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Cap total genuine injections.
    pub fn with_hit_limit(mut self, hit_limit: u64) -> Self {
        self.hit_limit = Some(hit_limit);
        self
    }

    /// The rule id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The matching condition.
    pub fn condition(&self) -> &FaultInjectionCondition {
        &self.condition
    }

    /// The injected result.
    pub fn result(&self) -> &FaultInjectionResult {
        &self.result
    }

    /// The configured hit limit, if any.
    pub fn hit_limit(&self) -> Option<u64> {
        self.hit_limit
    }

    /// Whether the rule is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Disable the rule. Disabled rules never match again until re-enabled.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Re-enable a previously disabled rule.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Activate the rule: enables it and starts the duration window.
    /// Called by the engine during batch registration.
    pub(crate) fn activate(&self) {
        *self.activated_at.lock() = Some(Instant::now());
        self.enabled.store(true, Ordering::Release);
    }

    /// Whether the duration window (if any) has elapsed.
    pub fn is_expired(&self) -> bool {
        match (self.duration, *self.activated_at.lock()) {
            (Some(window), Some(started)) => started.elapsed() >= window,
            _ => false,
        }
    }

    /// Whether the hit limit has been exhausted.
    pub fn is_hit_limit_reached(&self) -> bool {
        match self.hit_limit {
            Some(limit) => self.hit_count.load(Ordering::Acquire) >= limit,
            None => false,
        }
    }

    /// Total genuine injections so far.
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Acquire)
    }

    /// Snapshot of per-(operation, resource) hit counts.
    pub fn hit_count_details(&self) -> HitCountDetails {
        self.details
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Atomically claim one hit against the hit limit. Returns false when the
    /// limit is already exhausted, guaranteeing the count never exceeds it
    /// under concurrent operations.
    pub(crate) fn try_claim_hit(&self, op: OperationType) -> bool {
        let claimed = self
            .hit_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                match self.hit_limit {
                    Some(limit) if count >= limit => None,
                    _ => Some(count + 1),
                }
            })
            .is_ok();
        if claimed {
            self.details
                .entry((op, op.resource_type()))
                .and_modify(|c| *c += 1)
                .or_insert(1);
        }
        claimed
    }

    /// Atomically claim one unit of a cumulative `times` bound.
    pub(crate) fn try_claim_cumulative_times(&self, times: u64) -> bool {
        self.times_consumed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                if used >= times {
                    None
                } else {
                    Some(used + 1)
                }
            })
            .is_ok()
    }

    /// Release a previously claimed cumulative `times` unit (rate-missed draws
    /// do not count as affected attempts).
    pub(crate) fn release_cumulative_times(&self) {
        self.times_consumed.fetch_sub(1, Ordering::AcqRel);
    }

    /// Interval gate for connection-error firings: at most one per region per
    /// interval. Returns true when this firing is due.
    pub(crate) fn try_fire_connection(&self, region: &str, interval: Duration) -> bool {
        let mut last = self.last_connection_fire.lock();
        let key = region.to_ascii_lowercase();
        match last.get(&key) {
            Some(at) if at.elapsed() < interval => false,
            _ => {
                last.insert(key, Instant::now());
                true
            }
        }
    }
}

impl std::fmt::Debug for FaultInjectionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjectionRule")
            .field("id", &self.id)
            .field("enabled", &self.is_enabled())
            .field("hit_count", &self.hit_count())
            .field("hit_limit", &self.hit_limit)
            .finish()
    }
}
