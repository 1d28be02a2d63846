//! Region and account-level topology values.

use crate::error::TopologyError;
use serde::{Deserialize, Serialize};

/// A named, independently reachable deployment endpoint of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Region name, unique within an account. Compared case-insensitively.
    pub name: String,
    /// Opaque endpoint address.
    pub endpoint: String,
    /// Whether reads may route here.
    pub readable: bool,
    /// Whether writes may route here.
    pub writable: bool,
}

impl Region {
    /// Create a readable, writable region.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            readable: true,
            writable: true,
        }
    }

    /// Create a read-only region.
    pub fn read_only(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            writable: false,
            ..Self::new(name, endpoint)
        }
    }

    /// Lower-cased name, the form diagnostics and comparisons use.
    pub fn normalized_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// The account's full region set in service-declared order.
#[derive(Debug, Clone)]
pub struct AccountTopology {
    regions: Vec<Region>,
    default_region: String,
}

impl AccountTopology {
    /// Create an account topology. The first region is the default (home)
    /// region unless overridden with [`with_default_region`].
    ///
    /// [`with_default_region`]: AccountTopology::with_default_region
    pub fn new(regions: Vec<Region>) -> Result<Self, TopologyError> {
        if !regions.iter().any(|r| r.writable) {
            return Err(TopologyError::NoWritableRegion);
        }
        let default_region = regions[0].name.clone();
        Ok(Self {
            regions,
            default_region,
        })
    }

    /// Override the default region.
    pub fn with_default_region(mut self, name: impl Into<String>) -> Result<Self, TopologyError> {
        let name = name.into();
        if self.region(&name).is_none() {
            return Err(TopologyError::UnknownRegion(name));
        }
        self.default_region = name;
        Ok(self)
    }

    /// Look up a region by name, case-insensitively.
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.is_named(name))
    }

    /// All regions in service-declared order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The default (home) region.
    pub fn default_region(&self) -> &Region {
        // Validated at construction.
        self.region(&self.default_region)
            .unwrap_or(&self.regions[0])
    }

    /// Whether the account spans more than one region.
    pub fn is_multi_region(&self) -> bool {
        self.regions.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_regions() -> Vec<Region> {
        vec![
            Region::new("East US", "https://east.example"),
            Region::read_only("West US", "https://west.example"),
        ]
    }

    #[test]
    fn account_requires_writable_region() {
        let err = AccountTopology::new(vec![Region::read_only("East US", "e")]).unwrap_err();
        assert_eq!(err, TopologyError::NoWritableRegion);
    }

    #[test]
    fn default_region_is_first_unless_overridden() {
        let account = AccountTopology::new(two_regions()).unwrap();
        assert_eq!(account.default_region().name, "East US");

        let account = account.with_default_region("west us").unwrap();
        assert_eq!(account.default_region().name, "West US");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let account = AccountTopology::new(two_regions()).unwrap();
        assert!(account.region("EAST US").is_some());
        assert!(account.region("nowhere").is_none());
    }

    #[test]
    fn unknown_default_region_rejected() {
        let account = AccountTopology::new(two_regions()).unwrap();
        assert!(account.with_default_region("Central US").is_err());
    }
}
