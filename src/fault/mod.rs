//! Fault injection: declarative rules evaluated against every outbound
//! attempt, substituting injected outcomes for real calls.

pub mod condition;
pub mod engine;
pub mod result;
pub mod rule;

pub use condition::{EndpointScope, FaultInjectionCondition, MismatchReason};
pub use engine::{
    InjectedBehavior, InjectedOutcome, OperationContext, RuleEngine, RuleEngineStats,
    RuleEvaluation, RuleEvaluationResult,
};
pub use result::{
    ConnectionErrorKind, ConnectionErrorResult, FaultInjectionResult, ServerErrorKind,
    ServerErrorResult, TimesScope,
};
pub use rule::{FaultInjectionRule, HitCountDetails};
