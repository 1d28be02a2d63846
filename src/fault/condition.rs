//! Rule matching predicates.

use crate::topology::Region;
use crate::types::{ConnectionType, FeedRange, OperationDescriptor, OperationType};
use serde::{Deserialize, Serialize};

/// How narrowly a rule scopes the endpoints it affects.
///
/// Scope is the most granular matching axis and dominates specificity
/// ordering: a feed-range-scoped rule beats a replica-scoped rule, which
/// beats a full-range rule, regardless of registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointScope {
    /// The full address space.
    FullRange,
    /// A specific replica set size, optionally including the primary.
    Replicas {
        count: u32,
        include_primary: bool,
    },
    /// A specific partition key range.
    FeedRange(FeedRange),
}

impl EndpointScope {
    /// Specificity weight; higher matches first.
    pub fn specificity(&self) -> u32 {
        match self {
            Self::FullRange => 0,
            Self::Replicas { .. } => 1,
            Self::FeedRange(_) => 2,
        }
    }

    fn matches(&self, op: &OperationDescriptor) -> bool {
        match self {
            Self::FullRange | Self::Replicas { .. } => true,
            Self::FeedRange(scope) => match &op.feed_range {
                Some(range) => ranges_overlap(scope, range),
                // Operations without a range target the full space.
                None => true,
            },
        }
    }
}

fn ranges_overlap(a: &FeedRange, b: &FeedRange) -> bool {
    a.min_inclusive < b.max_exclusive && b.min_inclusive < a.max_exclusive
}

/// Why a rule did not apply to an attempt. Surfaced through diagnostics so
/// tests can assert on the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    AddressMismatch,
    OperationTypeMismatch,
    RegionEndpointMismatch,
    ConnectionTypeMismatch,
    HitLimitReached,
    Disabled,
    DurationExpired,
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::AddressMismatch => "Address mismatch",
            Self::OperationTypeMismatch => "Operation type mismatch",
            Self::RegionEndpointMismatch => "Region endpoint mismatch",
            Self::ConnectionTypeMismatch => "Connection type mismatch",
            Self::HitLimitReached => "Hit limit reached",
            Self::Disabled => "Rule disabled",
            Self::DurationExpired => "Rule duration expired",
        };
        f.write_str(text)
    }
}

/// Predicate over (region, connection type, operation type, endpoint scope).
/// Unset axes match anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultInjectionCondition {
    /// Region name the rule is scoped to, if any.
    pub region: Option<String>,
    /// Connection type the rule is scoped to, if any.
    pub connection_type: Option<ConnectionType>,
    /// Operation type the rule is scoped to, if any.
    pub operation_type: Option<OperationType>,
    /// Endpoint scope.
    pub endpoint_scope: EndpointScope,
}

impl Default for FaultInjectionCondition {
    fn default() -> Self {
        Self::any()
    }
}

impl FaultInjectionCondition {
    /// A condition matching every attempt.
    pub fn any() -> Self {
        Self {
            region: None,
            connection_type: None,
            operation_type: None,
            endpoint_scope: EndpointScope::FullRange,
        }
    }

    /// Restrict to a region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Restrict to a connection type.
    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = Some(connection_type);
        self
    }

    /// Restrict to an operation type.
    pub fn with_operation_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    /// Restrict the endpoint scope.
    pub fn with_endpoint_scope(mut self, scope: EndpointScope) -> Self {
        self.endpoint_scope = scope;
        self
    }

    /// Evaluate the condition. `None` means the condition is satisfied;
    /// otherwise the first failing axis is reported.
    pub fn mismatch(
        &self,
        op: &OperationDescriptor,
        region: &Region,
        connection_type: ConnectionType,
    ) -> Option<MismatchReason> {
        if let Some(want) = &self.region {
            if !region.is_named(want) {
                return Some(MismatchReason::RegionEndpointMismatch);
            }
        }
        if let Some(want) = self.connection_type {
            if want != connection_type {
                return Some(MismatchReason::ConnectionTypeMismatch);
            }
        }
        if let Some(want) = self.operation_type {
            if want != op.operation_type {
                return Some(MismatchReason::OperationTypeMismatch);
            }
        }
        if !self.endpoint_scope.matches(op) {
            return Some(MismatchReason::AddressMismatch);
        }
        None
    }

    /// Specificity weight for match ordering: endpoint scope dominates, then
    /// the number of constrained axes. Ties break by registration order.
    pub fn specificity(&self) -> u32 {
        let axes = [
            self.region.is_some(),
            self.connection_type.is_some(),
            self.operation_type.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count() as u32;
        self.endpoint_scope.specificity() * 10 + axes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn east() -> Region {
        Region::new("East US", "https://east.example")
    }

    #[test]
    fn unconstrained_condition_matches_everything() {
        let cond = FaultInjectionCondition::any();
        assert_eq!(
            cond.mismatch(
                &OperationDescriptor::read_item(),
                &east(),
                ConnectionType::Direct
            ),
            None
        );
    }

    #[test]
    fn region_mismatch_reported() {
        let cond = FaultInjectionCondition::any().with_region("West US");
        assert_eq!(
            cond.mismatch(
                &OperationDescriptor::read_item(),
                &east(),
                ConnectionType::Direct
            ),
            Some(MismatchReason::RegionEndpointMismatch)
        );
    }

    #[test]
    fn operation_type_mismatch_reported() {
        let cond =
            FaultInjectionCondition::any().with_operation_type(OperationType::CreateItem);
        assert_eq!(
            cond.mismatch(
                &OperationDescriptor::read_item(),
                &east(),
                ConnectionType::Direct
            ),
            Some(MismatchReason::OperationTypeMismatch)
        );
        assert_eq!(
            cond.mismatch(
                &OperationDescriptor::create_item(),
                &east(),
                ConnectionType::Direct
            ),
            None
        );
    }

    #[test]
    fn feed_range_scope_requires_overlap() {
        let cond = FaultInjectionCondition::any()
            .with_endpoint_scope(EndpointScope::FeedRange(FeedRange::new("00", "7F")));
        let inside = OperationDescriptor::read_item().with_feed_range(FeedRange::new("10", "20"));
        let outside = OperationDescriptor::read_item().with_feed_range(FeedRange::new("80", "FF"));
        assert_eq!(
            cond.mismatch(&inside, &east(), ConnectionType::Direct),
            None
        );
        assert_eq!(
            cond.mismatch(&outside, &east(), ConnectionType::Direct),
            Some(MismatchReason::AddressMismatch)
        );
    }

    #[test]
    fn specificity_ordering() {
        let full = FaultInjectionCondition::any();
        let replicas = FaultInjectionCondition::any().with_endpoint_scope(
            EndpointScope::Replicas {
                count: 3,
                include_primary: false,
            },
        );
        let range = FaultInjectionCondition::any()
            .with_endpoint_scope(EndpointScope::FeedRange(FeedRange::full()));
        assert!(range.specificity() > replicas.specificity());
        assert!(replicas.specificity() > full.specificity());

        // More constrained axes win within the same scope tier.
        let regional = FaultInjectionCondition::any().with_region("East US");
        assert!(regional.specificity() > full.specificity());
        assert!(replicas.specificity() > regional.specificity());
    }

    #[test]
    fn mismatch_reason_strings_are_stable() {
        assert_eq!(
            MismatchReason::OperationTypeMismatch.to_string(),
            "Operation type mismatch"
        );
        assert_eq!(MismatchReason::HitLimitReached.to_string(), "Hit limit reached");
        assert_eq!(MismatchReason::AddressMismatch.to_string(), "Address mismatch");
    }
}
