//! Error types for the failover engine.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the failover engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Fault-injection rule configuration errors.
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// Region topology errors.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Fault-injection rule configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    /// The injection rate is outside the valid (0, 1] range.
    #[error("injection rate must be in (0, 1], got {0}")]
    InvalidInjectionRate(f64),

    /// Two rules in a batch share the same id.
    #[error("duplicate rule id: {0}")]
    DuplicateRuleId(String),

    /// Connection error rules must affect at least one connection.
    #[error("connection error threshold must be at least 1")]
    ZeroThreshold,

    /// A rule with the given id is not registered.
    #[error("rule not found: {0}")]
    NotFound(String),
}

/// Region topology errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// A region name does not exist in the account.
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// The account declares no writable region.
    #[error("no writable region configured")]
    NoWritableRegion,

    /// A preferred region is not part of the account's region set.
    #[error("preferred region not in account: {0}")]
    PreferredRegionUnknown(String),
}

/// A service-level error outcome, real or injected.
///
/// Carries the status/substatus pair the retry policies dispatch on. The pair
/// is preserved end to end: when an operation exhausts all regions, the last
/// `ServiceError` observed is what the caller receives, never a synthetic
/// timeout.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("status {status}/{sub_status}: {message}")]
pub struct ServiceError {
    /// HTTP-style status code.
    pub status: u32,
    /// Service-specific substatus code.
    pub sub_status: u32,
    /// Human-readable description.
    pub message: String,
    /// Server-suggested backoff, when present (429 responses).
    pub retry_after: Option<Duration>,
}

impl ServiceError {
    /// Create a service error from a status/substatus pair.
    pub fn new(status: u32, sub_status: u32, message: impl Into<String>) -> Self {
        Self {
            status,
            sub_status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attach a server-suggested retry delay.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Replica gone, server generated.
    pub fn gone() -> Self {
        Self::new(
            crate::types::status::GONE,
            crate::types::sub_status::SERVER_GENERATED_GONE,
            "replica gone",
        )
    }

    /// Transport timeout wrapped as gone.
    pub fn transport_gone() -> Self {
        Self::new(
            crate::types::status::GONE,
            crate::types::sub_status::TRANSPORT_GENERATED_GONE,
            "transport timeout",
        )
    }

    /// Read session not available on the contacted replica.
    pub fn read_session_not_available() -> Self {
        Self::new(
            crate::types::status::NOT_FOUND,
            crate::types::sub_status::READ_SESSION_NOT_AVAILABLE,
            "read session not available",
        )
    }

    /// Region-wide service unavailable.
    pub fn service_unavailable() -> Self {
        Self::new(
            crate::types::status::SERVICE_UNAVAILABLE,
            crate::types::sub_status::SERVER_GENERATED_UNAVAILABLE,
            "service unavailable",
        )
    }

    /// Request rate too large.
    pub fn throttled() -> Self {
        Self::new(
            crate::types::status::TOO_MANY_REQUESTS,
            crate::types::sub_status::NONE,
            "request rate too large",
        )
    }

    /// Internal server error; never retried.
    pub fn internal_server_error() -> Self {
        Self::new(
            crate::types::status::INTERNAL_SERVER_ERROR,
            crate::types::sub_status::NONE,
            "internal server error",
        )
    }

    /// Whether the status is in the 2xx success band.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
