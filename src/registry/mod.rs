//! # Service Registry
//!
//! Read-only view of the service registry consumed by the snapshot builder:
//! the service catalog, the key/value configuration tree, and per-service
//! passing health records. The Consul HTTP implementation lives in
//! [`consul`]; the key-path bucketing operations live in [`paths`].

pub mod consul;
pub mod paths;

pub use consul::ConsulRegistry;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::Result;

/// Network tag naming the address reachable from the same network segment
pub const LAN_ADDRESS_TAG: &str = "lan";

/// Network tag naming the externally reachable address; endpoints without
/// one are rejected at admission
pub const WAN_ADDRESS_TAG: &str = "wan";

/// One key/value pair from the configuration tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    /// Slash-separated path of the form `<namespace>/<service>/<leaf>`
    pub key: String,
    /// Decoded value string
    pub value: String,
}

impl ConfigEntry {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// One passing instance of a service, as reported by a health query
#[derive(Debug, Clone, Default)]
pub struct HealthRecord {
    pub node_id: String,
    pub node_name: String,
    pub datacenter: String,
    /// Tags declared on the service registration
    pub tags: Vec<String>,
    /// Address declared on the service registration; may be empty
    pub service_address: String,
    /// Node addresses keyed by network tag (`lan`, `wan`)
    pub tagged_addresses: HashMap<String, String>,
    /// Service port; 0 means unset and fails admission
    pub port: u32,
}

impl HealthRecord {
    /// Address reachable from a different network segment, if set
    pub fn wan_address(&self) -> Option<&str> {
        self.tagged_address(WAN_ADDRESS_TAG)
    }

    /// Address reachable from the same network segment, if set
    pub fn lan_address(&self) -> Option<&str> {
        self.tagged_address(LAN_ADDRESS_TAG)
    }

    fn tagged_address(&self, tag: &str) -> Option<&str> {
        self.tagged_addresses.get(tag).map(String::as_str).filter(|address| !address.is_empty())
    }
}

/// Trait for reading registry state
///
/// One snapshot build performs one `list_services`, one
/// `list_config_entries`, and one `healthy_instances` per service, each a
/// point-in-time consistent read.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Names of all services in the catalog
    async fn list_services(&self) -> Result<Vec<String>>;

    /// All configuration entries under `namespace`, in key order
    async fn list_config_entries(&self, namespace: &str) -> Result<Vec<ConfigEntry>>;

    /// Instances of `service` with passing health checks, in discovery order
    async fn healthy_instances(&self, service: &str) -> Result<Vec<HealthRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_address_lookup() {
        let mut record = HealthRecord {
            node_id: "node-1".into(),
            node_name: "ip-10-0-0-5".into(),
            datacenter: "dc1".into(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(record.wan_address(), None);
        assert_eq!(record.lan_address(), None);

        record.tagged_addresses.insert(WAN_ADDRESS_TAG.into(), "203.0.113.5".into());
        record.tagged_addresses.insert(LAN_ADDRESS_TAG.into(), "10.0.0.5".into());
        assert_eq!(record.wan_address(), Some("203.0.113.5"));
        assert_eq!(record.lan_address(), Some("10.0.0.5"));
    }

    #[test]
    fn test_empty_tagged_address_is_absent() {
        let mut record = HealthRecord::default();
        record.tagged_addresses.insert(WAN_ADDRESS_TAG.into(), String::new());
        assert_eq!(record.wan_address(), None);
    }
}
