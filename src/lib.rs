//! Region failover and fault-injection governed retry engine for
//! multi-region database clients.
//!
//! This crate decides, for every logical operation, which region to contact,
//! how to react to real or injected server/connection errors, and when to
//! fail over across regions. It is transport-agnostic: the actual call is an
//! injected [`RegionBackend`] collaborator, and every decision the engine
//! makes is observable through [`OperationDiagnostics`].
//!
//! # Example
//!
//! ```rust,no_run
//! use meridian::{
//!     AccountTopology, ExecutorConfig, OperationDescriptor, Region, RegionTopology,
//!     RequestExecutor, RuleEngine, TopologyConfig,
//! };
//! use std::sync::Arc;
//!
//! # struct MyBackend;
//! # #[async_trait::async_trait]
//! # impl meridian::RegionBackend for MyBackend {
//! #     async fn execute(
//! #         &self,
//! #         _op: &OperationDescriptor,
//! #         _region: &Region,
//! #     ) -> Result<meridian::BackendResponse, meridian::ServiceError> {
//! #         Ok(meridian::BackendResponse::ok())
//! #     }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let account = AccountTopology::new(vec![
//!         Region::new("East US", "https://east.example"),
//!         Region::new("West US", "https://west.example"),
//!     ])?;
//!     let topology = Arc::new(
//!         RegionTopology::new(account, TopologyConfig::default())
//!             .with_preferred_regions(vec!["East US".into(), "West US".into()])?,
//!     );
//!     let executor = RequestExecutor::new(
//!         topology,
//!         Arc::new(RuleEngine::new()),
//!         Arc::new(MyBackend),
//!         ExecutorConfig::default(),
//!     );
//!
//!     let response = executor.execute(OperationDescriptor::read_item()).await?;
//!     println!("served by {}", response.region);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              RequestExecutor                │
//! │   drive attempts until terminal outcome     │
//! └─────────────────────────────────────────────┘
//!          │              │              │
//!          ▼              ▼              ▼
//! ┌──────────────┐ ┌────────────┐ ┌─────────────┐
//! │RegionTopology│ │ RuleEngine │ │ RetryPolicy │
//! │  candidates  │ │  injected  │ │    Chain    │
//! │  exclusion   │ │  outcomes  │ │  directives │
//! └──────────────┘ └────────────┘ └─────────────┘
//!          │
//!          ▼
//! ┌─────────────────────────────────────────────┐
//! │        DiagnosticsRecorder (trace)          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Fault injection
//!
//! Rules are declarative condition + result + lifetime records, registered in
//! batches that activate atomically:
//!
//! ```rust
//! use meridian::{
//!     FaultInjectionCondition, FaultInjectionResult, FaultInjectionRule, OperationType,
//!     RuleEngine, ServerErrorKind, ServerErrorResult,
//! };
//!
//! let engine = RuleEngine::new();
//! let handles = engine
//!     .register_rules(vec![FaultInjectionRule::new(
//!         "east-gone",
//!         FaultInjectionCondition::any()
//!             .with_region("East US")
//!             .with_operation_type(OperationType::ReadItem),
//!         FaultInjectionResult::ServerError(ServerErrorResult::new(ServerErrorKind::Gone)),
//!     )
//!     .with_hit_limit(5)])
//!     .unwrap();
//! assert_eq!(handles[0].hit_count(), 0);
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod fault;
pub mod retry;
pub mod testing;
pub mod topology;
pub mod types;

// Re-export main types for convenience
pub use config::{ConsistencyLevel, ExecutorConfig, RetryConfig, TopologyConfig};
pub use diagnostics::{
    AddressResolutionStatistics, AttemptStatistics, DiagnosticsRecorder, MetadataCallRecord,
    OperationDiagnostics,
};
pub use error::{Error, Result, RuleError, ServiceError, TopologyError};
pub use executor::{
    BackendResponse, OperationFailure, OperationResponse, RegionBackend, RequestExecutor,
    RequestOptions,
};
pub use fault::{
    ConnectionErrorKind, ConnectionErrorResult, EndpointScope, FaultInjectionCondition,
    FaultInjectionResult, FaultInjectionRule, HitCountDetails, InjectedBehavior, InjectedOutcome,
    MismatchReason, OperationContext, RuleEngine, RuleEngineStats, RuleEvaluation,
    RuleEvaluationResult, ServerErrorKind, ServerErrorResult, TimesScope,
};
pub use retry::{
    GonePolicy, MetadataRetryPolicy, RetryDecision, RetryPolicyChain, SessionRetryPolicy,
    ThrottlePolicy,
};
pub use topology::{
    AccountTopology, ExcludedRegionSupplier, Region, RegionTopology, TopologySnapshot,
};
pub use types::{
    status, sub_status, ConnectionType, FeedRange, OperationDescriptor, OperationType,
    RegionSwitchHint, ResourceType,
};
