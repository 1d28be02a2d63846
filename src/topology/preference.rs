//! Candidate region resolution.
//!
//! Resolves the ordered region list for each operation from the preferred
//! region list, the excluded-region set (static, supplier-driven, or
//! request-scoped), and the unavailability tracker. The excluded set is
//! snapshotted once at operation start, so concurrent mutation never changes
//! the candidate list of an operation already in flight.

use crate::config::TopologyConfig;
use crate::error::TopologyError;
use crate::types::OperationDescriptor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Supplier re-evaluated at the start of each top-level operation to produce
/// the current excluded-region set.
pub type ExcludedRegionSupplier = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

use super::region::{AccountTopology, Region};

/// Resolves ordered candidate regions per operation.
pub struct RegionTopology {
    account: AccountTopology,
    /// Preferred region names, insertion order = preference order.
    preferred: Vec<String>,
    /// Client-level static exclusions.
    static_excluded: Vec<String>,
    /// Optional supplier overriding the static exclusions per operation.
    excluded_supplier: RwLock<Option<ExcludedRegionSupplier>>,
    /// Regions marked down, with the instant their cooldown elapses.
    unavailable: RwLock<HashMap<String, Instant>>,
    config: TopologyConfig,
}

impl RegionTopology {
    /// Create a topology over the given account with no preferred regions.
    pub fn new(account: AccountTopology, config: TopologyConfig) -> Self {
        Self {
            account,
            preferred: Vec::new(),
            static_excluded: Vec::new(),
            excluded_supplier: RwLock::new(None),
            unavailable: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Set the preferred region list. Every name must exist in the account.
    pub fn with_preferred_regions(
        mut self,
        preferred: Vec<String>,
    ) -> Result<Self, TopologyError> {
        for name in &preferred {
            if self.account.region(name).is_none() {
                return Err(TopologyError::PreferredRegionUnknown(name.clone()));
            }
        }
        self.preferred = preferred;
        Ok(self)
    }

    /// Set the client-level static excluded regions.
    pub fn with_excluded_regions(mut self, excluded: Vec<String>) -> Self {
        self.static_excluded = excluded;
        self
    }

    /// Install a supplier consulted once per top-level operation. Replaces
    /// the static excluded set while installed.
    pub fn set_excluded_region_supplier(&self, supplier: ExcludedRegionSupplier) {
        *self.excluded_supplier.write() = Some(supplier);
    }

    /// Remove the excluded-region supplier.
    pub fn clear_excluded_region_supplier(&self) {
        *self.excluded_supplier.write() = None;
    }

    /// The account topology.
    pub fn account(&self) -> &AccountTopology {
        &self.account
    }

    /// Whether the account spans more than one region.
    pub fn is_multi_region(&self) -> bool {
        self.account.is_multi_region()
    }

    /// Resolve the excluded set for one operation. Request-scoped overrides
    /// win over the supplier, which wins over the static set. Called exactly
    /// once per top-level operation.
    pub fn excluded_snapshot(&self, request_override: Option<&[String]>) -> Vec<String> {
        let raw = if let Some(excluded) = request_override {
            excluded.to_vec()
        } else if let Some(supplier) = self.excluded_supplier.read().as_ref() {
            supplier()
        } else {
            self.static_excluded.clone()
        };
        raw.into_iter().map(|n| n.to_ascii_lowercase()).collect()
    }

    /// Resolve the ordered candidate list for an operation against a
    /// previously taken excluded snapshot.
    ///
    /// Exclusion narrows but never empties the reachable set: if every
    /// preferred region is excluded, the account's full region set in
    /// service-declared order is used; if that too is emptied by
    /// unavailability marks, the default region remains.
    pub fn candidates(&self, op: &OperationDescriptor, excluded: &[String]) -> Vec<Region> {
        self.sweep_recovered();

        let preferred: Vec<Region> = if self.preferred.is_empty() {
            vec![self.account.default_region().clone()]
        } else {
            self.preferred
                .iter()
                .filter_map(|name| self.account.region(name))
                .filter(|r| self.role_matches(r, op))
                .cloned()
                .collect()
        };

        let filtered: Vec<Region> = preferred
            .iter()
            .filter(|r| !excluded.contains(&r.normalized_name()))
            .filter(|r| self.is_available(&r.name))
            .cloned()
            .collect();
        if !filtered.is_empty() {
            return filtered;
        }

        // Every preferred region excluded: fall back to the account set in
        // service-declared order, still honoring unavailability marks.
        let fallback: Vec<Region> = self
            .account
            .regions()
            .iter()
            .filter(|r| self.role_matches(r, op))
            .filter(|r| self.is_available(&r.name))
            .cloned()
            .collect();
        if !fallback.is_empty() {
            return fallback;
        }

        vec![self.account.default_region().clone()]
    }

    fn role_matches(&self, region: &Region, op: &OperationDescriptor) -> bool {
        if op.is_write() {
            region.writable
        } else {
            region.readable
        }
    }

    /// Mark a region unavailable for the configured cooldown.
    pub fn mark_unavailable(&self, name: &str) {
        let until = Instant::now() + self.config.unavailable_cooldown;
        tracing::warn!(
            region = %name,
            cooldown = ?self.config.unavailable_cooldown,
            "marking region unavailable"
        );
        self.unavailable
            .write()
            .insert(name.to_ascii_lowercase(), until);
    }

    /// Whether a region is currently contactable.
    pub fn is_available(&self, name: &str) -> bool {
        match self.unavailable.read().get(&name.to_ascii_lowercase()) {
            Some(until) => Instant::now() >= *until,
            None => true,
        }
    }

    /// Drop unavailability marks whose cooldown has elapsed.
    fn sweep_recovered(&self) {
        let now = Instant::now();
        let mut unavailable = self.unavailable.write();
        unavailable.retain(|name, until| {
            let recovered = now >= *until;
            if recovered {
                tracing::info!(region = %name, "region cooldown elapsed, back in rotation");
            }
            !recovered
        });
    }

    /// Introspection snapshot of the current topology state.
    pub fn snapshot(&self) -> TopologySnapshot {
        self.sweep_recovered();
        let now = Instant::now();
        TopologySnapshot {
            preferred_regions: self.preferred.clone(),
            static_excluded_regions: self.static_excluded.clone(),
            unavailable_regions: self
                .unavailable
                .read()
                .iter()
                .map(|(name, until)| (name.clone(), until.saturating_duration_since(now)))
                .collect(),
        }
    }
}

impl std::fmt::Debug for RegionTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionTopology")
            .field("preferred", &self.preferred)
            .field("static_excluded", &self.static_excluded)
            .field("has_supplier", &self.excluded_supplier.read().is_some())
            .finish()
    }
}

/// Point-in-time view of the topology, for observability and tests.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    /// Preferred region names in preference order.
    pub preferred_regions: Vec<String>,
    /// Client-level static exclusions.
    pub static_excluded_regions: Vec<String>,
    /// Regions currently down, with remaining cooldown.
    pub unavailable_regions: Vec<(String, Duration)>,
}
