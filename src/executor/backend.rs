//! The seam to the real service: a backend performs the actual call when no
//! rule intercepts it.

use crate::error::ServiceError;
use crate::topology::Region;
use crate::types::OperationDescriptor;
use async_trait::async_trait;

/// A successful backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    /// Status code, 2xx.
    pub status: u32,
    /// Opaque payload, when the operation returns one.
    pub payload: Option<Vec<u8>>,
}

impl BackendResponse {
    /// A plain 200 with no payload.
    pub fn ok() -> Self {
        Self {
            status: crate::types::status::OK,
            payload: None,
        }
    }

    /// A 200 carrying a payload.
    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            status: crate::types::status::OK,
            payload: Some(payload.into()),
        }
    }
}

/// Performs real calls against a region. Implementations are transport
/// plumbing and out of the engine's scope; tests supply deterministic fakes.
#[async_trait]
pub trait RegionBackend: Send + Sync {
    /// Execute a data-plane operation against a region.
    async fn execute(
        &self,
        op: &OperationDescriptor,
        region: &Region,
    ) -> Result<BackendResponse, ServiceError>;

    /// Resolve replica addresses for a region (metadata plane).
    async fn resolve_addresses(
        &self,
        region: &Region,
        force_refresh: bool,
    ) -> Result<(), ServiceError> {
        let _ = (region, force_refresh);
        Ok(())
    }
}
