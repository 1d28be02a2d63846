//! End-to-end failover and fault-injection scenarios.

use crate::config::{ExecutorConfig, RetryConfig, TopologyConfig};
use crate::executor::RequestOptions;
use crate::fault::{
    FaultInjectionCondition, FaultInjectionResult, FaultInjectionRule, ServerErrorKind,
    ServerErrorResult,
};
use crate::testing::{executor_with, init_tracing, two_region_topology, StaticBackend};
use crate::types::{
    status, sub_status, OperationDescriptor, OperationType, RegionSwitchHint,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn region_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn fast_retry_config() -> RetryConfig {
    RetryConfig::new()
        .with_session_retry_wait(Duration::from_millis(1))
        .with_metadata_retry_wait(Duration::from_millis(1))
        .with_throttle_base_delay(Duration::from_millis(1))
}

fn rule(
    id: &str,
    condition: FaultInjectionCondition,
    result: ServerErrorResult,
) -> FaultInjectionRule {
    FaultInjectionRule::new(id, condition, FaultInjectionResult::ServerError(result))
}

#[tokio::test]
async fn healthy_operation_contacts_first_preferred_region() {
    init_tracing();
    let topology = two_region_topology(TopologyConfig::default());
    let backend = Arc::new(StaticBackend::new());
    let executor = executor_with(topology, backend.clone(), ExecutorConfig::default());

    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(response.status, status::OK);
    assert_eq!(response.region, "east us");
    assert_eq!(
        response.diagnostics.contacted_region_names,
        region_set(&["east us"])
    );
    assert_eq!(backend.calls(), vec!["east us"]);
}

#[tokio::test]
async fn excluding_all_but_one_region_routes_write_there() {
    let topology = two_region_topology(TopologyConfig::default());
    let executor = executor_with(
        topology,
        Arc::new(StaticBackend::new()),
        ExecutorConfig::default(),
    );

    let response = executor
        .execute_with_options(
            OperationDescriptor::create_item(),
            RequestOptions::new().with_excluded_regions(vec!["East US".into()]),
        )
        .await
        .unwrap();
    assert_eq!(
        response.diagnostics.contacted_region_names,
        region_set(&["west us"])
    );
}

#[tokio::test]
async fn request_scoped_exclusion_overrides_client_scoped() {
    let topology = two_region_topology(TopologyConfig::default());
    topology.set_excluded_region_supplier(Arc::new(|| vec!["West US".into()]));
    let executor = executor_with(
        topology,
        Arc::new(StaticBackend::new()),
        ExecutorConfig::default(),
    );

    // Client-scoped exclusion alone routes to East US.
    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(response.region, "east us");

    // The request-scoped override replaces it entirely for one call.
    let response = executor
        .execute_with_options(
            OperationDescriptor::read_item(),
            RequestOptions::new().with_excluded_regions(vec!["East US".into()]),
        )
        .await
        .unwrap();
    assert_eq!(response.region, "west us");
}

#[tokio::test]
async fn supplier_mutation_changes_only_subsequent_operations() {
    let excluded = Arc::new(Mutex::new(Vec::<String>::new()));
    let topology = two_region_topology(TopologyConfig::default());
    let supplier_view = excluded.clone();
    topology.set_excluded_region_supplier(Arc::new(move || supplier_view.lock().clone()));

    let executor = executor_with(
        topology,
        Arc::new(StaticBackend::new()),
        ExecutorConfig::default(),
    );

    let first = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(
        first.diagnostics.contacted_region_names,
        region_set(&["east us"])
    );

    // Mutate between operations; the completed trace is untouched and only
    // the next operation sees the new exclusion.
    *excluded.lock() = vec!["East US".into()];
    let second = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(
        first.diagnostics.contacted_region_names,
        region_set(&["east us"])
    );
    assert_eq!(
        second.diagnostics.contacted_region_names,
        region_set(&["west us"])
    );
}

#[tokio::test]
async fn remote_region_preferred_fails_over_after_one_local_attempt() {
    let topology = two_region_topology(TopologyConfig::default());
    let config = ExecutorConfig::new().with_retry_config(
        fast_retry_config().with_region_switch_hint(RegionSwitchHint::RemoteRegionPreferred),
    );
    let executor = executor_with(topology, Arc::new(StaticBackend::new()), config);
    executor
        .rules()
        .register_rules(vec![rule(
            "east-session",
            FaultInjectionCondition::any().with_region("East US"),
            ServerErrorResult::new(ServerErrorKind::ReadSessionNotAvailable),
        )])
        .unwrap();

    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(
        response.diagnostics.contacted_region_names,
        region_set(&["east us", "west us"])
    );
    // Initial attempt plus one local retry in East US, then West US.
    assert_eq!(response.diagnostics.response_statistics.len(), 3);
    assert_eq!(response.region, "west us");
}

#[tokio::test]
async fn local_region_preferred_absorbs_fault_within_local_retries() {
    let topology = two_region_topology(TopologyConfig::default());
    let config = ExecutorConfig::new().with_retry_config(
        fast_retry_config()
            .with_region_switch_hint(RegionSwitchHint::LocalRegionPreferred)
            .with_session_local_retries(3),
    );
    let executor = executor_with(topology, Arc::new(StaticBackend::new()), config);
    // The fault stops after three injections, within the local retry budget.
    executor
        .rules()
        .register_rules(vec![rule(
            "east-session",
            FaultInjectionCondition::any().with_region("East US"),
            ServerErrorResult::new(ServerErrorKind::ReadSessionNotAvailable).with_times(3),
        )])
        .unwrap();

    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(
        response.diagnostics.contacted_region_names,
        region_set(&["east us"])
    );
    assert_eq!(response.diagnostics.response_statistics.len(), 4);
}

#[tokio::test]
async fn hit_limit_exhaustion_reports_reason_in_trace() {
    let topology = two_region_topology(TopologyConfig::default());
    let config = ExecutorConfig::new().with_retry_config(fast_retry_config());
    let executor = executor_with(topology, Arc::new(StaticBackend::new()), config);
    let handles = executor
        .rules()
        .register_rules(vec![rule(
            "limited",
            FaultInjectionCondition::any().with_region("East US"),
            ServerErrorResult::new(ServerErrorKind::ReadSessionNotAvailable),
        )
        .with_hit_limit(1)])
        .unwrap();

    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    let attempts = &response.diagnostics.response_statistics;
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].injected);
    assert!(!attempts[1].injected);
    assert!(attempts[1]
        .fault_injection_evaluation_results
        .iter()
        .any(|r| r.contains("Hit limit reached")));
    assert_eq!(handles[0].hit_count(), 1);
}

#[tokio::test]
async fn operation_type_scoped_rule_never_fires_for_other_operations() {
    let topology = two_region_topology(TopologyConfig::default());
    let executor = executor_with(
        topology,
        Arc::new(StaticBackend::new()),
        ExecutorConfig::default(),
    );
    executor
        .rules()
        .register_rules(vec![rule(
            "creates-500",
            FaultInjectionCondition::any().with_operation_type(OperationType::CreateItem),
            ServerErrorResult::new(ServerErrorKind::InternalServerError),
        )])
        .unwrap();

    // Reads pass through and the trace explains why the rule did not apply.
    let read = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(read.diagnostics.injected_attempt_count(), 0);
    assert!(read.diagnostics.response_statistics[0]
        .fault_injection_evaluation_results
        .iter()
        .any(|r| r.contains("Operation type mismatch")));

    // Creates are hit and the 500 is not retried.
    let create = executor
        .execute(OperationDescriptor::create_item())
        .await
        .unwrap_err();
    assert_eq!(create.error.status, status::INTERNAL_SERVER_ERROR);
    assert_eq!(create.diagnostics.response_statistics.len(), 1);
}

#[tokio::test]
async fn disabling_rules_restores_healthy_routing() {
    let topology = two_region_topology(TopologyConfig::default());
    let config = ExecutorConfig::new().with_retry_config(fast_retry_config());
    let executor = executor_with(topology, Arc::new(StaticBackend::new()), config);
    // Scoped to reads so the address refreshes the gone handling forces are
    // untouched and East US is never marked unavailable.
    executor
        .rules()
        .register_rules(vec![rule(
            "east-gone",
            FaultInjectionCondition::any()
                .with_region("East US")
                .with_operation_type(OperationType::ReadItem),
            ServerErrorResult::new(ServerErrorKind::Gone),
        )])
        .unwrap();

    let faulted = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(
        faulted.diagnostics.contacted_region_names,
        region_set(&["east us", "west us"])
    );

    executor.rules().disable_all();
    let healthy = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(
        healthy.diagnostics.contacted_region_names,
        region_set(&["east us"])
    );
    assert_eq!(healthy.diagnostics.injected_attempt_count(), 0);
}

#[tokio::test]
async fn service_unavailable_fails_over_cross_region() {
    let topology = two_region_topology(TopologyConfig::default());
    let executor = executor_with(
        topology,
        Arc::new(StaticBackend::new()),
        ExecutorConfig::default(),
    );
    executor
        .rules()
        .register_rules(vec![rule(
            "east-503",
            FaultInjectionCondition::any().with_region("East US"),
            ServerErrorResult::new(ServerErrorKind::ServiceUnavailable),
        )])
        .unwrap();

    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    let statuses: Vec<u32> = response
        .diagnostics
        .response_statistics
        .iter()
        .map(|a| a.status)
        .collect();
    assert_eq!(statuses, vec![status::SERVICE_UNAVAILABLE, status::OK]);
    assert_eq!(response.region, "west us");
}

#[tokio::test]
async fn throttling_retries_same_region_only() {
    let topology = two_region_topology(TopologyConfig::default());
    let config = ExecutorConfig::new().with_retry_config(fast_retry_config());
    let executor = executor_with(topology, Arc::new(StaticBackend::new()), config);
    executor
        .rules()
        .register_rules(vec![rule(
            "east-429",
            FaultInjectionCondition::any().with_region("East US"),
            ServerErrorResult::new(ServerErrorKind::TooManyRequests).with_times(2),
        )])
        .unwrap();

    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(
        response.diagnostics.contacted_region_names,
        region_set(&["east us"])
    );
    assert_eq!(response.diagnostics.response_statistics.len(), 3);
    assert_eq!(response.diagnostics.injected_attempt_count(), 2);
}

#[tokio::test]
async fn metadata_exhaustion_marks_region_unavailable() {
    init_tracing();
    let topology = two_region_topology(
        TopologyConfig::new().with_unavailable_cooldown(Duration::from_secs(60)),
    );
    let config = ExecutorConfig::new().with_retry_config(fast_retry_config());
    let executor = executor_with(topology.clone(), Arc::new(StaticBackend::new()), config);
    executor
        .rules()
        .register_rules(vec![
            // The data plane keeps reporting the replica gone in East US...
            rule(
                "east-gone",
                FaultInjectionCondition::any().with_region("East US"),
                ServerErrorResult::new(ServerErrorKind::Gone),
            ),
            // ...and the triggered address refreshes time out too.
            rule(
                "east-address-timeout",
                FaultInjectionCondition::any()
                    .with_region("East US")
                    .with_operation_type(OperationType::MetadataAddressRefresh),
                ServerErrorResult::new(ServerErrorKind::Timeout),
            ),
        ])
        .unwrap();

    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(response.region, "west us");

    // One refresh attempt plus three retries before the region-down signal.
    let resolutions = &response.diagnostics.address_resolution_statistics;
    assert_eq!(resolutions.len(), 4);
    assert!(resolutions
        .iter()
        .all(|r| r.fault_injection_rule_id.as_deref() == Some("east-address-timeout")));
    assert!(!response.diagnostics.metadata_diagnostics.is_empty());

    // East US sits out its cooldown: a follow-up operation with all faults
    // disabled contacts only the healthy region.
    executor.rules().disable_all();
    let snapshot = topology.snapshot();
    assert_eq!(snapshot.unavailable_regions.len(), 1);
    assert_eq!(snapshot.unavailable_regions[0].0, "east us");

    let followup = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(
        followup.diagnostics.contacted_region_names,
        region_set(&["west us"])
    );
    assert_eq!(followup.diagnostics.injected_attempt_count(), 0);
}

#[tokio::test]
async fn deadline_expiry_preserves_originating_error() {
    let topology = two_region_topology(TopologyConfig::default());
    let config = ExecutorConfig::new()
        .with_request_timeout(Duration::from_millis(60))
        .with_retry_config(
            RetryConfig::new()
                .with_session_retry_wait(Duration::from_millis(20))
                .with_session_local_retries(1000),
        );
    let executor = executor_with(topology, Arc::new(StaticBackend::new()), config);
    // Unlimited session faults everywhere: the operation can never finish.
    executor
        .rules()
        .register_rules(vec![rule(
            "session-everywhere",
            FaultInjectionCondition::any(),
            ServerErrorResult::new(ServerErrorKind::ReadSessionNotAvailable),
        )])
        .unwrap();

    let failure = executor
        .execute(OperationDescriptor::read_item())
        .await
        .unwrap_err();
    // The last observed error, not a synthetic timeout.
    assert_eq!(failure.error.status, status::NOT_FOUND);
    assert_eq!(failure.error.sub_status, sub_status::READ_SESSION_NOT_AVAILABLE);
    assert!(!failure.diagnostics.response_statistics.is_empty());
}

#[tokio::test]
async fn response_delay_fault_succeeds_after_delay() {
    let topology = two_region_topology(TopologyConfig::default());
    let executor = executor_with(
        topology,
        Arc::new(StaticBackend::new()),
        ExecutorConfig::default(),
    );
    executor
        .rules()
        .register_rules(vec![rule(
            "slow-east",
            FaultInjectionCondition::any().with_region("East US"),
            ServerErrorResult::new(ServerErrorKind::ResponseDelay)
                .with_delay(Duration::from_millis(20))
                .with_times(1),
        )])
        .unwrap();

    let response = executor.execute(OperationDescriptor::read_item()).await.unwrap();
    assert_eq!(response.status, status::OK);
    let attempt = &response.diagnostics.response_statistics[0];
    assert!(attempt.injected);
    assert!(attempt.latency >= Duration::from_millis(20));
}

#[tokio::test]
async fn concurrent_operations_count_hits_exactly() {
    let topology = two_region_topology(TopologyConfig::default());
    let executor = Arc::new(executor_with(
        topology,
        Arc::new(StaticBackend::new()),
        ExecutorConfig::default(),
    ));
    let handles = executor
        .rules()
        .register_rules(vec![rule(
            "create-500",
            FaultInjectionCondition::any().with_operation_type(OperationType::CreateItem),
            ServerErrorResult::new(ServerErrorKind::InternalServerError),
        )])
        .unwrap();

    // Each create fails exactly once (500s are not retried), so N concurrent
    // operations produce exactly N hits.
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let executor = executor.clone();
        tasks.push(tokio::spawn(async move {
            executor
                .execute(OperationDescriptor::create_item())
                .await
                .unwrap_err()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(handles[0].hit_count(), 20);
}
