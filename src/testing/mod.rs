//! Test utilities: deterministic backends and harness builders.
//!
//! These are used by the scenario tests in this module and are exported for
//! downstream integration tests that need a controllable backend.

#[cfg(test)]
mod failover_tests;

/// Install a test-writer tracing subscriber once per process. Controlled by
/// `RUST_LOG`, silent by default.
#[cfg(test)]
pub(crate) fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

use crate::config::{ExecutorConfig, TopologyConfig};
use crate::error::ServiceError;
use crate::executor::{BackendResponse, RegionBackend, RequestExecutor};
use crate::fault::RuleEngine;
use crate::topology::{AccountTopology, Region, RegionTopology};
use crate::types::OperationDescriptor;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A backend that always succeeds and records which regions it was asked to
/// contact.
#[derive(Debug, Default)]
pub struct StaticBackend {
    calls: Mutex<Vec<String>>,
}

impl StaticBackend {
    /// Create a backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower-cased region names of every data-plane call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RegionBackend for StaticBackend {
    async fn execute(
        &self,
        _op: &OperationDescriptor,
        region: &Region,
    ) -> Result<BackendResponse, ServiceError> {
        self.calls.lock().push(region.normalized_name());
        Ok(BackendResponse::ok())
    }
}

/// A backend that fails the first `fail_times` data-plane calls with a fixed
/// error, then succeeds.
#[derive(Debug)]
pub struct FlakyBackend {
    error: ServiceError,
    fail_times: u64,
    failures_served: AtomicU64,
    calls: Mutex<Vec<String>>,
}

impl FlakyBackend {
    /// Create a backend failing the first `fail_times` calls with `error`.
    pub fn new(error: ServiceError, fail_times: u64) -> Self {
        Self {
            error,
            fail_times,
            failures_served: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Lower-cased region names of every data-plane call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RegionBackend for FlakyBackend {
    async fn execute(
        &self,
        _op: &OperationDescriptor,
        region: &Region,
    ) -> Result<BackendResponse, ServiceError> {
        self.calls.lock().push(region.normalized_name());
        let served = self.failures_served.fetch_add(1, Ordering::SeqCst);
        if served < self.fail_times {
            Err(self.error.clone())
        } else {
            Ok(BackendResponse::ok())
        }
    }
}

/// Build a two-region topology ("East US" preferred, then "West US") with
/// the given config.
pub fn two_region_topology(config: TopologyConfig) -> Arc<RegionTopology> {
    let account = AccountTopology::new(vec![
        Region::new("East US", "https://east.example"),
        Region::new("West US", "https://west.example"),
    ])
    .expect("two writable regions");
    Arc::new(
        RegionTopology::new(account, config)
            .with_preferred_regions(vec!["East US".into(), "West US".into()])
            .expect("known preferred regions"),
    )
}

/// Build an executor over a fresh rule engine and the given backend.
pub fn executor_with<B: RegionBackend>(
    topology: Arc<RegionTopology>,
    backend: Arc<B>,
    config: ExecutorConfig,
) -> RequestExecutor<B> {
    RequestExecutor::new(topology, Arc::new(RuleEngine::new()), backend, config)
}
