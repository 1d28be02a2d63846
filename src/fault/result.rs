//! Injected outcome descriptions.
//!
//! A rule's result is a tagged union: a simulated server error (status and
//! substatus derived from the kind) or a connection-level error with firing
//! interval and connection threshold.

use crate::error::{RuleError, ServiceError};
use crate::types::{status, sub_status};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether a result's `times` bound is consumed per logical operation or
/// cumulatively across the rule's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimesScope {
    /// `times` caps affected attempts across all operations for the rule's
    /// lifetime. Matches rules reused across many calls, e.g. address-refresh
    /// faults.
    #[default]
    Cumulative,
    /// `times` resets for each logical operation invocation.
    PerOperation,
}

/// Simulated server error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerErrorKind {
    /// 410 with server-generated substatus.
    Gone,
    /// Transport timeout wrapped as 410.
    Timeout,
    /// 429 request rate too large.
    TooManyRequests,
    /// 404/1002 session consistency miss.
    ReadSessionNotAvailable,
    /// 500, never retried.
    InternalServerError,
    /// 503 region-wide unavailability.
    ServiceUnavailable,
    /// 449 concurrency conflict.
    RetryWith,
    /// 410/1008 routing-map stale.
    PartitionIsMigrating,
    /// 410/1007 routing-map stale.
    PartitionIsSplitting,
    /// Delay the response, then succeed.
    ResponseDelay,
}

impl ServerErrorKind {
    /// Status/substatus pair this kind simulates. `ResponseDelay` succeeds,
    /// so it maps to 200.
    pub fn status_codes(&self) -> (u32, u32) {
        match self {
            Self::Gone => (status::GONE, sub_status::SERVER_GENERATED_GONE),
            Self::Timeout => (status::GONE, sub_status::TRANSPORT_GENERATED_GONE),
            Self::TooManyRequests => (status::TOO_MANY_REQUESTS, sub_status::NONE),
            Self::ReadSessionNotAvailable => {
                (status::NOT_FOUND, sub_status::READ_SESSION_NOT_AVAILABLE)
            }
            Self::InternalServerError => (status::INTERNAL_SERVER_ERROR, sub_status::NONE),
            Self::ServiceUnavailable => (
                status::SERVICE_UNAVAILABLE,
                sub_status::SERVER_GENERATED_UNAVAILABLE,
            ),
            Self::RetryWith => (status::RETRY_WITH, sub_status::NONE),
            Self::PartitionIsMigrating => (status::GONE, sub_status::PARTITION_IS_MIGRATING),
            Self::PartitionIsSplitting => (status::GONE, sub_status::PARTITION_IS_SPLITTING),
            Self::ResponseDelay => (status::OK, sub_status::NONE),
        }
    }

    /// Build the service error this kind injects.
    pub fn to_service_error(&self, rule_id: &str) -> ServiceError {
        let (code, sub) = self.status_codes();
        ServiceError::new(code, sub, format!("injected by rule {rule_id}"))
    }
}

/// Connection-level error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionErrorKind {
    /// Delay connection establishment, then proceed with the real call.
    ConnectionDelay,
    /// Reset the connection; surfaces as a transport-generated 410.
    ConnectionReset,
}

/// A simulated server error with injection controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerErrorResult {
    /// The error kind to inject.
    pub kind: ServerErrorKind,
    /// Delay applied before the injected outcome is delivered.
    pub delay: Option<Duration>,
    /// Cap on affected matching attempts; absent = unlimited within
    /// duration/hit limit.
    pub times: Option<u64>,
    /// How `times` is consumed.
    pub times_scope: TimesScope,
    /// Fraction of matches actually injected, in (0, 1].
    pub injection_rate: f64,
}

impl ServerErrorResult {
    /// Create a result injecting every match.
    pub fn new(kind: ServerErrorKind) -> Self {
        Self {
            kind,
            delay: None,
            times: None,
            times_scope: TimesScope::default(),
            injection_rate: 1.0,
        }
    }

    /// Delay delivery of the injected outcome.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cap affected attempts.
    pub fn with_times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    /// Choose how `times` is consumed.
    pub fn with_times_scope(mut self, scope: TimesScope) -> Self {
        self.times_scope = scope;
        self
    }

    /// Set the Bernoulli injection rate. Rejected outside (0, 1].
    pub fn with_injection_rate(mut self, rate: f64) -> Result<Self, RuleError> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(RuleError::InvalidInjectionRate(rate));
        }
        self.injection_rate = rate;
        Ok(self)
    }
}

/// A simulated connection error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionErrorResult {
    /// The error kind to inject.
    pub kind: ConnectionErrorKind,
    /// Minimum interval between firings per region.
    pub interval: Duration,
    /// Number of pooled connections notionally affected per firing.
    pub threshold: u32,
}

impl ConnectionErrorResult {
    /// Create a connection error result. The threshold must be at least 1.
    pub fn new(
        kind: ConnectionErrorKind,
        interval: Duration,
        threshold: u32,
    ) -> Result<Self, RuleError> {
        if threshold == 0 {
            return Err(RuleError::ZeroThreshold);
        }
        Ok(Self {
            kind,
            interval,
            threshold,
        })
    }
}

/// What a matching rule injects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FaultInjectionResult {
    /// A simulated server error.
    ServerError(ServerErrorResult),
    /// A simulated connection error.
    ConnectionError(ConnectionErrorResult),
}

impl FaultInjectionResult {
    /// The injection rate; connection errors always inject when due.
    pub fn injection_rate(&self) -> f64 {
        match self {
            Self::ServerError(r) => r.injection_rate,
            Self::ConnectionError(_) => 1.0,
        }
    }

    /// The `times` bound and its scope, when present.
    pub fn times(&self) -> Option<(u64, TimesScope)> {
        match self {
            Self::ServerError(r) => r.times.map(|t| (t, r.times_scope)),
            Self::ConnectionError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_status_mapping() {
        assert_eq!(
            ServerErrorKind::Gone.status_codes(),
            (410, sub_status::SERVER_GENERATED_GONE)
        );
        assert_eq!(
            ServerErrorKind::Timeout.status_codes(),
            (410, sub_status::TRANSPORT_GENERATED_GONE)
        );
        assert_eq!(ServerErrorKind::ReadSessionNotAvailable.status_codes(), (404, 1002));
        assert_eq!(ServerErrorKind::ServiceUnavailable.status_codes(), (503, 21008));
        assert_eq!(ServerErrorKind::InternalServerError.status_codes(), (500, 0));
    }

    #[test]
    fn injection_rate_bounds() {
        assert!(ServerErrorResult::new(ServerErrorKind::Gone)
            .with_injection_rate(0.5)
            .is_ok());
        assert!(ServerErrorResult::new(ServerErrorKind::Gone)
            .with_injection_rate(1.0)
            .is_ok());
        assert_eq!(
            ServerErrorResult::new(ServerErrorKind::Gone)
                .with_injection_rate(0.0)
                .unwrap_err(),
            RuleError::InvalidInjectionRate(0.0)
        );
        assert!(ServerErrorResult::new(ServerErrorKind::Gone)
            .with_injection_rate(-0.2)
            .is_err());
        assert!(ServerErrorResult::new(ServerErrorKind::Gone)
            .with_injection_rate(1.5)
            .is_err());
    }

    #[test]
    fn connection_error_threshold_validated() {
        assert_eq!(
            ConnectionErrorResult::new(
                ConnectionErrorKind::ConnectionReset,
                Duration::from_secs(1),
                0
            )
            .unwrap_err(),
            RuleError::ZeroThreshold
        );
    }

    #[test]
    fn injected_error_message_names_the_rule() {
        let err = ServerErrorKind::Gone.to_service_error("rule-7");
        assert!(err.message.contains("rule-7"));
    }
}
