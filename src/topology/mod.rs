//! Region topology: accounts, preferred regions, exclusion, availability.

pub mod preference;
pub mod region;

pub use preference::{ExcludedRegionSupplier, RegionTopology, TopologySnapshot};
pub use region::{AccountTopology, Region};
