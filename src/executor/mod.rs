//! Drives one logical operation through topology, rule engine, and retry
//! chain until success, exhaustion, or a non-retriable error.

pub mod backend;

pub use backend::{BackendResponse, RegionBackend};

use crate::config::ExecutorConfig;
use crate::diagnostics::{DiagnosticsRecorder, OperationDiagnostics};
use crate::error::ServiceError;
use crate::fault::{InjectedBehavior, OperationContext, RuleEngine};
use crate::retry::{RetryDecision, RetryPolicyChain};
use crate::topology::{Region, RegionTopology};
use crate::types::{ConnectionType, OperationDescriptor, OperationType};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Per-request options overriding client-level configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Request-scoped excluded regions; wins over the client-level exclusion
    /// for this single call only.
    pub excluded_regions: Option<Vec<String>>,
    /// Request-scoped deadline override.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude regions for this call only.
    pub fn with_excluded_regions(mut self, excluded: Vec<String>) -> Self {
        self.excluded_regions = Some(excluded);
        self
    }

    /// Override the operation deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A completed operation with its trace.
#[derive(Debug)]
pub struct OperationResponse {
    /// Final status code.
    pub status: u32,
    /// Lower-cased region that served the operation.
    pub region: String,
    /// Opaque payload, when present.
    pub payload: Option<Vec<u8>>,
    /// Full diagnostics trace.
    pub diagnostics: OperationDiagnostics,
}

/// A failed operation: the last observed service error plus the full trace.
///
/// The originating status/substatus is always preserved; deadline expiry
/// surfaces the last error seen, never a synthetic timeout.
#[derive(Debug, Error)]
#[error("operation failed: {error}")]
pub struct OperationFailure {
    /// The last observed service error.
    pub error: ServiceError,
    /// Full diagnostics trace.
    pub diagnostics: OperationDiagnostics,
}

enum RefreshOutcome {
    Refreshed,
    RegionDown,
    DeadlineExceeded,
}

/// Drives logical operations to a terminal outcome.
pub struct RequestExecutor<B: RegionBackend> {
    topology: Arc<RegionTopology>,
    rules: Arc<RuleEngine>,
    backend: Arc<B>,
    config: ExecutorConfig,
}

impl<B: RegionBackend> RequestExecutor<B> {
    /// Create an executor.
    pub fn new(
        topology: Arc<RegionTopology>,
        rules: Arc<RuleEngine>,
        backend: Arc<B>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            topology,
            rules,
            backend,
            config,
        }
    }

    /// The topology, for introspection.
    pub fn topology(&self) -> &Arc<RegionTopology> {
        &self.topology
    }

    /// The rule engine, for rule lifecycle management.
    pub fn rules(&self) -> &Arc<RuleEngine> {
        &self.rules
    }

    /// Execute an operation with default options.
    pub async fn execute(
        &self,
        op: OperationDescriptor,
    ) -> Result<OperationResponse, OperationFailure> {
        self.execute_with_options(op, RequestOptions::default()).await
    }

    /// Execute an operation.
    pub async fn execute_with_options(
        &self,
        op: OperationDescriptor,
        options: RequestOptions,
    ) -> Result<OperationResponse, OperationFailure> {
        let deadline =
            Instant::now() + options.timeout.unwrap_or(self.config.request_timeout);
        // Snapshotted once: concurrent supplier mutation only affects
        // operations started afterwards.
        let excluded = self
            .topology
            .excluded_snapshot(options.excluded_regions.as_deref());
        let candidates = self.topology.candidates(&op, &excluded);
        tracing::debug!(
            op = ?op.operation_type,
            candidates = ?candidates.iter().map(|r| r.normalized_name()).collect::<Vec<_>>(),
            "resolved candidate regions"
        );

        let mut chain = RetryPolicyChain::new(
            self.config.retry.clone(),
            self.config.consistency,
            self.topology.is_multi_region(),
        );
        let recorder = DiagnosticsRecorder::new();
        let mut ctx = OperationContext::new();
        let mut last_error: Option<ServiceError> = None;
        let mut index = 0usize;

        loop {
            let Some(region) = candidates.get(index) else {
                return Err(Self::failure(last_error, recorder));
            };

            let started = Instant::now();
            let (outcome, rule_id, evaluation_results) =
                self.attempt(&mut ctx, &op, region, self.config.connection_type, deadline)
                    .await;
            let latency = started.elapsed();

            let (code, sub) = match &outcome {
                Ok(resp) => (resp.status, crate::types::sub_status::NONE),
                Err(err) => (err.status, err.sub_status),
            };
            recorder.record_attempt(
                self.config.connection_type,
                &region.name,
                code,
                sub,
                rule_id.as_deref(),
                &evaluation_results,
                latency,
            );
            if op.is_metadata() {
                recorder.record_metadata_call(Self::metadata_call_name(&op), latency);
            }

            let err = match outcome {
                Ok(resp) => {
                    return Ok(OperationResponse {
                        status: resp.status,
                        region: region.normalized_name(),
                        payload: resp.payload,
                        diagnostics: recorder.finish(),
                    });
                }
                Err(err) => err,
            };

            let decision = if op.is_metadata() {
                chain.decide_metadata(&err)
            } else {
                chain.decide(&op, &err)
            };
            last_error = Some(err);

            match decision {
                RetryDecision::RetrySameRegion {
                    delay,
                    force_address_refresh,
                } => {
                    if force_address_refresh {
                        match self
                            .refresh_addresses(&mut ctx, &mut chain, region, &recorder, deadline)
                            .await
                        {
                            RefreshOutcome::Refreshed => {}
                            RefreshOutcome::RegionDown => {
                                self.topology.mark_unavailable(&region.name);
                                chain.on_region_switched();
                                index += 1;
                                continue;
                            }
                            RefreshOutcome::DeadlineExceeded => {
                                return Err(Self::failure(last_error, recorder));
                            }
                        }
                    }
                    if let Some(delay) = delay {
                        if !sleep_within_deadline(delay, deadline).await {
                            return Err(Self::failure(last_error, recorder));
                        }
                    }
                }
                RetryDecision::RetryNextRegion {
                    delay,
                    replace_error,
                } => {
                    if let Some(err) = replace_error {
                        last_error = Some(err);
                    }
                    chain.on_region_switched();
                    index += 1;
                    if let Some(delay) = delay {
                        if !sleep_within_deadline(delay, deadline).await {
                            return Err(Self::failure(last_error, recorder));
                        }
                    }
                }
                RetryDecision::MarkUnavailableAndSwitch => {
                    self.topology.mark_unavailable(&region.name);
                    chain.on_region_switched();
                    index += 1;
                }
                RetryDecision::Fail => {
                    return Err(Self::failure(last_error, recorder));
                }
            }

            if Instant::now() >= deadline {
                return Err(Self::failure(last_error, recorder));
            }
        }
    }

    /// Issue one attempt: rule evaluation first, real call only when nothing
    /// injects.
    async fn attempt(
        &self,
        ctx: &mut OperationContext,
        op: &OperationDescriptor,
        region: &Region,
        connection_type: ConnectionType,
        deadline: Instant,
    ) -> (
        Result<BackendResponse, ServiceError>,
        Option<String>,
        Vec<crate::fault::RuleEvaluationResult>,
    ) {
        let evaluation = self.rules.evaluate(ctx, op, region, connection_type);
        let results = evaluation.evaluation_results;
        match evaluation.injected {
            Some(injected) => {
                let rule_id = injected.rule_id;
                let outcome = match injected.behavior {
                    InjectedBehavior::Error { error, delay } => {
                        if let Some(delay) = delay {
                            sleep_within_deadline(delay, deadline).await;
                        }
                        Err(error)
                    }
                    InjectedBehavior::DelayThenSucceed { delay } => {
                        sleep_within_deadline(delay, deadline).await;
                        Ok(BackendResponse::ok())
                    }
                    InjectedBehavior::DelayThenProceed { delay } => {
                        sleep_within_deadline(delay, deadline).await;
                        self.backend.execute(op, region).await
                    }
                };
                (outcome, Some(rule_id), results)
            }
            None => (self.backend.execute(op, region).await, None, results),
        }
    }

    /// Drive a forced address refresh through the rule engine and the
    /// metadata retry policy. Exhaustion reports the region as down.
    async fn refresh_addresses(
        &self,
        ctx: &mut OperationContext,
        chain: &mut RetryPolicyChain,
        region: &Region,
        recorder: &DiagnosticsRecorder,
        deadline: Instant,
    ) -> RefreshOutcome {
        let meta_op = OperationDescriptor::new(OperationType::MetadataAddressRefresh);
        loop {
            let started = Instant::now();
            // Metadata calls always go through the gateway.
            let (outcome, rule_id, _) = self
                .attempt_metadata(ctx, &meta_op, region, deadline)
                .await;
            recorder.record_address_resolution(&region.name, true, rule_id.as_deref());
            recorder.record_metadata_call("AddressRefresh", started.elapsed());

            match outcome {
                Ok(()) => return RefreshOutcome::Refreshed,
                Err(err) => match chain.decide_metadata(&err) {
                    RetryDecision::RetrySameRegion { delay, .. } => {
                        if let Some(delay) = delay {
                            if !sleep_within_deadline(delay, deadline).await {
                                return RefreshOutcome::DeadlineExceeded;
                            }
                        }
                    }
                    _ => {
                        tracing::warn!(
                            region = %region.name,
                            "address refresh exhausted, treating region as down"
                        );
                        return RefreshOutcome::RegionDown;
                    }
                },
            }
            if Instant::now() >= deadline {
                return RefreshOutcome::DeadlineExceeded;
            }
        }
    }

    async fn attempt_metadata(
        &self,
        ctx: &mut OperationContext,
        meta_op: &OperationDescriptor,
        region: &Region,
        deadline: Instant,
    ) -> (
        Result<(), ServiceError>,
        Option<String>,
        Vec<crate::fault::RuleEvaluationResult>,
    ) {
        let evaluation = self
            .rules
            .evaluate(ctx, meta_op, region, ConnectionType::Gateway);
        let results = evaluation.evaluation_results;
        match evaluation.injected {
            Some(injected) => {
                let rule_id = injected.rule_id;
                let outcome = match injected.behavior {
                    InjectedBehavior::Error { error, delay } => {
                        if let Some(delay) = delay {
                            sleep_within_deadline(delay, deadline).await;
                        }
                        Err(error)
                    }
                    InjectedBehavior::DelayThenSucceed { delay } => {
                        sleep_within_deadline(delay, deadline).await;
                        Ok(())
                    }
                    InjectedBehavior::DelayThenProceed { delay } => {
                        sleep_within_deadline(delay, deadline).await;
                        self.backend.resolve_addresses(region, true).await
                    }
                };
                (outcome, Some(rule_id), results)
            }
            None => (
                self.backend.resolve_addresses(region, true).await,
                None,
                results,
            ),
        }
    }

    fn metadata_call_name(op: &OperationDescriptor) -> &'static str {
        match op.operation_type {
            OperationType::MetadataAddressRefresh => "AddressRefresh",
            OperationType::MetadataPartitionKeyRanges => "PartitionKeyRanges",
            _ => "Metadata",
        }
    }

    fn failure(
        last_error: Option<ServiceError>,
        recorder: DiagnosticsRecorder,
    ) -> OperationFailure {
        OperationFailure {
            error: last_error.unwrap_or_else(ServiceError::service_unavailable),
            diagnostics: recorder.finish(),
        }
    }
}

/// Sleep for `delay`, clamped to the deadline. Returns false when the
/// deadline cut the sleep short.
async fn sleep_within_deadline(delay: Duration, deadline: Instant) -> bool {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if delay <= remaining {
        tokio::time::sleep(delay).await;
        true
    } else {
        tokio::time::sleep(remaining).await;
        false
    }
}
