//! Rule registry and per-attempt evaluation.
//!
//! Rules are registered in batches and become active atomically. Evaluation
//! walks matching rules by specificity (narrower endpoint scope first, then
//! more constrained conditions, ties by registration order) and injects the
//! first applicable one, subject to its `times` bound and injection rate.

use crate::error::{RuleError, ServiceError};
use crate::fault::condition::MismatchReason;
use crate::fault::result::{
    ConnectionErrorKind, FaultInjectionResult, ServerErrorKind, TimesScope,
};
use crate::fault::rule::FaultInjectionRule;
use crate::topology::Region;
use crate::types::{ConnectionType, OperationDescriptor};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-operation evaluation state, owned by the executor for the lifetime of
/// one logical operation. Tracks consumption of `PerOperation` times bounds.
#[derive(Debug, Default)]
pub struct OperationContext {
    times_used: HashMap<String, u64>,
}

impl OperationContext {
    /// Create a fresh context for one logical operation.
    pub fn new() -> Self {
        Self::default()
    }

    fn try_claim_times(&mut self, rule_id: &str, times: u64) -> bool {
        let used = self.times_used.entry(rule_id.to_string()).or_insert(0);
        if *used >= times {
            return false;
        }
        *used += 1;
        true
    }

    fn release_times(&mut self, rule_id: &str) {
        if let Some(used) = self.times_used.get_mut(rule_id) {
            *used = used.saturating_sub(1);
        }
    }
}

/// What an injected match does to the attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectedBehavior {
    /// Deliver a service error, optionally after a delay.
    Error {
        error: ServiceError,
        delay: Option<Duration>,
    },
    /// Delay, then let the attempt succeed (response-delay faults).
    DelayThenSucceed { delay: Duration },
    /// Delay, then perform the real call (connection-delay faults).
    DelayThenProceed { delay: Duration },
}

/// The outcome substituted for a real call by a matching rule.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedOutcome {
    /// Id of the rule that fired.
    pub rule_id: String,
    /// The injected behavior.
    pub behavior: InjectedBehavior,
}

/// Why a registered rule did not apply to an attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluationResult {
    /// The rule that was considered.
    pub rule_id: String,
    /// Why it did not apply.
    pub reason: MismatchReason,
}

impl std::fmt::Display for RuleEvaluationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.rule_id, self.reason)
    }
}

/// Result of evaluating all registered rules against one attempt.
#[derive(Debug, Default)]
pub struct RuleEvaluation {
    /// The injected outcome, when a rule applied.
    pub injected: Option<InjectedOutcome>,
    /// Per-rule mismatch reasons for rules that did not apply.
    pub evaluation_results: Vec<RuleEvaluationResult>,
}

/// Aggregate engine counters, for observability and tests.
#[derive(Debug, Clone)]
pub struct RuleEngineStats {
    /// Rules currently registered.
    pub rules_registered: usize,
    /// Attempts evaluated.
    pub total_evaluations: u64,
    /// Attempts genuinely injected.
    pub total_injections: u64,
}

/// Stores active fault-injection rules and evaluates them per attempt.
pub struct RuleEngine {
    /// Registration order preserved; specificity sorting happens per
    /// evaluation so id-based disable stays O(1) over this vec.
    rules: RwLock<Vec<Arc<FaultInjectionRule>>>,
    enabled: AtomicBool,
    evaluations: AtomicU64,
    injections: AtomicU64,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(true),
            evaluations: AtomicU64::new(0),
            injections: AtomicU64::new(0),
        }
    }

    /// Register a batch of rules. The batch becomes active atomically: no
    /// in-flight evaluation observes a partially registered batch. Returns
    /// handles for lifecycle inspection (hit counts, disable).
    pub fn register_rules(
        &self,
        batch: Vec<FaultInjectionRule>,
    ) -> Result<Vec<Arc<FaultInjectionRule>>, RuleError> {
        let mut rules = self.rules.write();
        for rule in &batch {
            if batch.iter().filter(|r| r.id() == rule.id()).count() > 1
                || rules.iter().any(|r| r.id() == rule.id())
            {
                return Err(RuleError::DuplicateRuleId(rule.id().to_string()));
            }
        }
        let handles: Vec<Arc<FaultInjectionRule>> =
            batch.into_iter().map(Arc::new).collect();
        for rule in &handles {
            rule.activate();
            tracing::debug!(rule_id = %rule.id(), "fault injection rule activated");
        }
        rules.extend(handles.iter().cloned());
        Ok(handles)
    }

    /// Disable one rule by id.
    pub fn disable_rule(&self, id: &str) -> Result<(), RuleError> {
        let rules = self.rules.read();
        match rules.iter().find(|r| r.id() == id) {
            Some(rule) => {
                rule.disable();
                Ok(())
            }
            None => Err(RuleError::NotFound(id.to_string())),
        }
    }

    /// Disable every registered rule.
    pub fn disable_all(&self) {
        for rule in self.rules.read().iter() {
            rule.disable();
        }
    }

    /// Remove every registered rule.
    pub fn clear(&self) {
        self.rules.write().clear();
    }

    /// Globally gate injection without touching individual rules.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Look up a registered rule by id.
    pub fn rule(&self, id: &str) -> Option<Arc<FaultInjectionRule>> {
        self.rules.read().iter().find(|r| r.id() == id).cloned()
    }

    /// Aggregate counters.
    pub fn stats(&self) -> RuleEngineStats {
        RuleEngineStats {
            rules_registered: self.rules.read().len(),
            total_evaluations: self.evaluations.load(Ordering::Relaxed),
            total_injections: self.injections.load(Ordering::Relaxed),
        }
    }

    /// Evaluate all rules against one attempt. At most one rule injects; the
    /// rest report their mismatch reason for the diagnostics trace.
    pub fn evaluate(
        &self,
        ctx: &mut OperationContext,
        op: &OperationDescriptor,
        region: &Region,
        connection_type: ConnectionType,
    ) -> RuleEvaluation {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let mut evaluation = RuleEvaluation::default();
        if !self.enabled.load(Ordering::Acquire) {
            return evaluation;
        }

        let mut candidates: Vec<(usize, Arc<FaultInjectionRule>)> = self
            .rules
            .read()
            .iter()
            .cloned()
            .enumerate()
            .collect();
        // Narrowest scope wins; registration order breaks ties.
        candidates.sort_by(|(ai, a), (bi, b)| {
            b.condition()
                .specificity()
                .cmp(&a.condition().specificity())
                .then(ai.cmp(bi))
        });

        for (_, rule) in candidates {
            let reason = self.applicability(&rule, op, region, connection_type);
            if let Some(reason) = reason {
                evaluation.evaluation_results.push(RuleEvaluationResult {
                    rule_id: rule.id().to_string(),
                    reason,
                });
                continue;
            }

            match self.try_inject(ctx, &rule, op, region) {
                InjectAttempt::Injected(outcome) => {
                    self.injections.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        rule_id = %rule.id(),
                        region = %region.name,
                        op = ?op.operation_type,
                        "fault injected"
                    );
                    evaluation.injected = Some(outcome);
                    return evaluation;
                }
                // Rate miss or interval gate: the match passes through
                // untouched and no further rule is considered.
                InjectAttempt::PassThrough => return evaluation,
                InjectAttempt::TimesExhausted => {
                    evaluation.evaluation_results.push(RuleEvaluationResult {
                        rule_id: rule.id().to_string(),
                        reason: MismatchReason::HitLimitReached,
                    });
                }
            }
        }

        evaluation
    }

    fn applicability(
        &self,
        rule: &FaultInjectionRule,
        op: &OperationDescriptor,
        region: &Region,
        connection_type: ConnectionType,
    ) -> Option<MismatchReason> {
        if !rule.is_enabled() {
            return Some(MismatchReason::Disabled);
        }
        if rule.is_expired() {
            return Some(MismatchReason::DurationExpired);
        }
        if rule.is_hit_limit_reached() {
            return Some(MismatchReason::HitLimitReached);
        }
        rule.condition().mismatch(op, region, connection_type)
    }

    fn try_inject(
        &self,
        ctx: &mut OperationContext,
        rule: &Arc<FaultInjectionRule>,
        op: &OperationDescriptor,
        region: &Region,
    ) -> InjectAttempt {
        // Claim against the times bound before the rate draw so concurrent
        // operations cannot overshoot it; released again on a rate miss since
        // pass-throughs are not affected attempts.
        let claimed_scope = match rule.result().times() {
            Some((times, TimesScope::Cumulative)) => {
                if !rule.try_claim_cumulative_times(times) {
                    return InjectAttempt::TimesExhausted;
                }
                Some(TimesScope::Cumulative)
            }
            Some((times, TimesScope::PerOperation)) => {
                if !ctx.try_claim_times(rule.id(), times) {
                    return InjectAttempt::TimesExhausted;
                }
                Some(TimesScope::PerOperation)
            }
            None => None,
        };

        let release = |scope: Option<TimesScope>, ctx: &mut OperationContext| match scope {
            Some(TimesScope::Cumulative) => rule.release_cumulative_times(),
            Some(TimesScope::PerOperation) => ctx.release_times(rule.id()),
            None => {}
        };

        let rate = rule.result().injection_rate();
        if rate < 1.0 && rand::random::<f64>() >= rate {
            release(claimed_scope, ctx);
            return InjectAttempt::PassThrough;
        }

        let behavior = match rule.result() {
            FaultInjectionResult::ServerError(server) => match server.kind {
                ServerErrorKind::ResponseDelay => InjectedBehavior::DelayThenSucceed {
                    delay: server.delay.unwrap_or(Duration::ZERO),
                },
                kind => InjectedBehavior::Error {
                    error: kind.to_service_error(rule.id()),
                    delay: server.delay,
                },
            },
            FaultInjectionResult::ConnectionError(conn) => {
                if !rule.try_fire_connection(&region.name, conn.interval) {
                    release(claimed_scope, ctx);
                    return InjectAttempt::PassThrough;
                }
                match conn.kind {
                    ConnectionErrorKind::ConnectionDelay => InjectedBehavior::DelayThenProceed {
                        delay: conn.interval,
                    },
                    ConnectionErrorKind::ConnectionReset => InjectedBehavior::Error {
                        error: ServiceError::transport_gone(),
                        delay: None,
                    },
                }
            }
        };

        if !rule.try_claim_hit(op.operation_type) {
            release(claimed_scope, ctx);
            return InjectAttempt::TimesExhausted;
        }

        InjectAttempt::Injected(InjectedOutcome {
            rule_id: rule.id().to_string(),
            behavior,
        })
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules_registered", &self.rules.read().len())
            .finish()
    }
}

enum InjectAttempt {
    Injected(InjectedOutcome),
    PassThrough,
    TimesExhausted,
}
