//! Core types used throughout the failover engine.

use serde::{Deserialize, Serialize};

/// Status codes returned by the service (real or injected).
pub mod status {
    pub const OK: u32 = 200;
    pub const CREATED: u32 = 201;
    pub const NO_CONTENT: u32 = 204;
    pub const BAD_REQUEST: u32 = 400;
    pub const NOT_FOUND: u32 = 404;
    pub const REQUEST_TIMEOUT: u32 = 408;
    pub const GONE: u32 = 410;
    pub const TOO_MANY_REQUESTS: u32 = 429;
    pub const RETRY_WITH: u32 = 449;
    pub const INTERNAL_SERVER_ERROR: u32 = 500;
    pub const SERVICE_UNAVAILABLE: u32 = 503;
}

/// Substatus codes refining the service status.
pub mod sub_status {
    pub const NONE: u32 = 0;
    /// The contacted replica has not observed the expected session.
    pub const READ_SESSION_NOT_AVAILABLE: u32 = 1002;
    /// The partition is splitting; routing map is stale.
    pub const PARTITION_IS_SPLITTING: u32 = 1007;
    /// The partition is migrating; routing map is stale.
    pub const PARTITION_IS_MIGRATING: u32 = 1008;
    /// Transport-level timeout (408) wrapped as a 410.
    pub const TRANSPORT_GENERATED_GONE: u32 = 20001;
    /// Server produced the 410 itself.
    pub const SERVER_GENERATED_GONE: u32 = 21005;
    /// Region-wide 503 produced by the server.
    pub const SERVER_GENERATED_UNAVAILABLE: u32 = 21008;
}

/// Logical operation kinds the engine routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    ReadItem,
    CreateItem,
    ReplaceItem,
    UpsertItem,
    DeleteItem,
    PatchItem,
    QueryItems,
    Batch,
    Bulk,
    ReadFeed,
    /// Replica address lookup (metadata plane).
    MetadataAddressRefresh,
    /// Partition key range lookup (metadata plane).
    MetadataPartitionKeyRanges,
}

impl OperationType {
    /// Whether this operation mutates data and must route to writable regions.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::CreateItem
                | Self::ReplaceItem
                | Self::UpsertItem
                | Self::DeleteItem
                | Self::PatchItem
                | Self::Batch
                | Self::Bulk
        )
    }

    /// Whether this is a metadata-plane call rather than a data operation.
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            Self::MetadataAddressRefresh | Self::MetadataPartitionKeyRanges
        )
    }

    /// The resource class this operation targets, used for hit-count details.
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::MetadataAddressRefresh => ResourceType::Address,
            Self::MetadataPartitionKeyRanges => ResourceType::PartitionKeyRange,
            _ => ResourceType::Item,
        }
    }
}

/// Resource classes for hit-count bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Item,
    Address,
    PartitionKeyRange,
}

/// How the client connects to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    /// Direct TCP to replicas.
    Direct,
    /// Through the gateway.
    Gateway,
    /// Through the thin-client gateway.
    GatewayV2,
}

/// Controls whether retries exhaust the local region before failing over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionSwitchHint {
    /// Retry within the current region until local retries are exhausted.
    LocalRegionPreferred,
    /// Switch to the next preferred region after a minimal local attempt count.
    RemoteRegionPreferred,
}

/// A partition key range targeted by an operation or a rule scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedRange {
    /// Inclusive lower bound of the range.
    pub min_inclusive: String,
    /// Exclusive upper bound of the range.
    pub max_exclusive: String,
}

impl FeedRange {
    /// Create a feed range from its bounds.
    pub fn new(min_inclusive: impl Into<String>, max_exclusive: impl Into<String>) -> Self {
        Self {
            min_inclusive: min_inclusive.into(),
            max_exclusive: max_exclusive.into(),
        }
    }

    /// The full address space.
    pub fn full() -> Self {
        Self::new("", "FF")
    }
}

/// Describes one logical operation submitted to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Operation kind.
    pub operation_type: OperationType,
    /// Target partition range, when the operation is range-scoped.
    pub feed_range: Option<FeedRange>,
    /// Whether a write may be safely replayed across regions.
    pub idempotent: bool,
}

impl OperationDescriptor {
    /// Create a descriptor for the given operation type.
    pub fn new(operation_type: OperationType) -> Self {
        Self {
            operation_type,
            feed_range: None,
            idempotent: false,
        }
    }

    /// Point read.
    pub fn read_item() -> Self {
        Self::new(OperationType::ReadItem)
    }

    /// Item create.
    pub fn create_item() -> Self {
        Self::new(OperationType::CreateItem)
    }

    /// Query across items.
    pub fn query() -> Self {
        Self::new(OperationType::QueryItems)
    }

    /// Scope the operation to a feed range.
    pub fn with_feed_range(mut self, range: FeedRange) -> Self {
        self.feed_range = Some(range);
        self
    }

    /// Mark a write as safe to replay across regions.
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Whether this operation must route to writable regions.
    pub fn is_write(&self) -> bool {
        self.operation_type.is_write()
    }

    /// Whether this is a metadata-plane call.
    pub fn is_metadata(&self) -> bool {
        self.operation_type.is_metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_classification() {
        assert!(OperationType::CreateItem.is_write());
        assert!(OperationType::Bulk.is_write());
        assert!(!OperationType::ReadItem.is_write());
        assert!(!OperationType::QueryItems.is_write());
        assert!(!OperationType::MetadataAddressRefresh.is_write());
    }

    #[test]
    fn metadata_classification() {
        assert!(OperationType::MetadataAddressRefresh.is_metadata());
        assert!(OperationType::MetadataPartitionKeyRanges.is_metadata());
        assert!(!OperationType::ReadItem.is_metadata());
    }

    #[test]
    fn resource_types() {
        assert_eq!(OperationType::ReadItem.resource_type(), ResourceType::Item);
        assert_eq!(
            OperationType::MetadataAddressRefresh.resource_type(),
            ResourceType::Address
        );
        assert_eq!(
            OperationType::MetadataPartitionKeyRanges.resource_type(),
            ResourceType::PartitionKeyRange
        );
    }

    #[test]
    fn descriptor_builders() {
        let op = OperationDescriptor::create_item()
            .with_feed_range(FeedRange::new("00", "7F"))
            .with_idempotent(true);
        assert!(op.is_write());
        assert!(op.idempotent);
        assert_eq!(op.feed_range.as_ref().unwrap().min_inclusive, "00");
    }
}
