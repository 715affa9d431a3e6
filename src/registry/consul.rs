//! Consul HTTP API client.
//!
//! Implements [`ServiceRegistry`] against the Consul agent's HTTP endpoints:
//! `/v1/catalog/services` for the catalog, `/v1/kv/<namespace>` for the
//! configuration tree, and `/v1/health/service/<name>` for passing
//! instances. Every read asks for a consistent view so one snapshot build
//! observes a single point in time per query.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::RegistryConfig;
use crate::errors::{Error, Result};

use super::{ConfigEntry, HealthRecord, ServiceRegistry};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Registry backed by a Consul agent's HTTP API
pub struct ConsulRegistry {
    client: Client,
    base_url: String,
}

impl ConsulRegistry {
    /// Creates a client pointed at the configured Consul agent
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        Self::with_base_url(config.base_url())
    }

    /// Creates a client against an explicit base URL such as
    /// `http://127.0.0.1:8500`
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::registry(format!("Failed to build Consul HTTP client: {e}")))?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    async fn get(&self, url: &str) -> Result<Response> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::registry(format!("Request to {url} failed: {e}")))
    }

    async fn read_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        decode_json(response, url).await
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn list_services(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/catalog/services?consistent=true", self.base_url);
        // The catalog maps service name to tags; only the names matter here,
        // in lexical order so snapshot contents are deterministic.
        let catalog: BTreeMap<String, Vec<String>> = self.read_json(&url).await?;
        Ok(catalog.into_keys().collect())
    }

    async fn list_config_entries(&self, namespace: &str) -> Result<Vec<ConfigEntry>> {
        let url =
            format!("{}/v1/kv/{}?recurse=true&consistent=true", self.base_url, namespace);
        let response = self.get(&url).await?;

        // Consul answers 404 when the namespace holds no keys at all.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let pairs: Vec<KvPair> = decode_json(response, &url).await?;
        pairs.into_iter().map(config_entry_from_pair).collect()
    }

    async fn healthy_instances(&self, service: &str) -> Result<Vec<HealthRecord>> {
        let url = format!(
            "{}/v1/health/service/{}?passing=true&consistent=true",
            self.base_url, service
        );
        let entries: Vec<ServiceEntry> = self.read_json(&url).await?;
        Ok(entries.into_iter().map(HealthRecord::from).collect())
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::registry(format!("{url} returned status {status}")));
    }
    response
        .json()
        .await
        .map_err(|e| Error::registry(format!("Failed to decode response from {url}: {e}")))
}

fn config_entry_from_pair(pair: KvPair) -> Result<ConfigEntry> {
    let value = match pair.value {
        Some(encoded) => {
            let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                Error::registry(format!("Invalid base64 value at key {}: {e}", pair.key))
            })?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        None => String::new(),
    };
    Ok(ConfigEntry::new(pair.key, value))
}

/// One key/value pair as returned by `/v1/kv/...?recurse=true`. Values are
/// base64 encoded and null for keys created without a value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KvPair {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

/// One entry from `/v1/health/service/<name>`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    node: Node,
    service: AgentService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Node {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(default)]
    node: String,
    #[serde(default)]
    datacenter: String,
    #[serde(default)]
    tagged_addresses: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u32,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl From<ServiceEntry> for HealthRecord {
    fn from(entry: ServiceEntry) -> Self {
        Self {
            node_id: entry.node.id,
            node_name: entry.node.node,
            datacenter: entry.node.datacenter,
            tags: entry.service.tags.unwrap_or_default(),
            service_address: entry.service.address,
            tagged_addresses: entry.node.tagged_addresses.unwrap_or_default(),
            port: entry.service.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_base64_kv_value() {
        let pair: KvPair = serde_json::from_str(
            r#"{"Key": "service/payments/public", "Value": "cGF5bWVudHMuZXhhbXBsZS5jb20="}"#,
        )
        .unwrap();
        let entry = config_entry_from_pair(pair).unwrap();
        assert_eq!(entry.key, "service/payments/public");
        assert_eq!(entry.value, "payments.example.com");
    }

    #[test]
    fn test_null_kv_value_becomes_empty_string() {
        let pair: KvPair =
            serde_json::from_str(r#"{"Key": "service/payments/public", "Value": null}"#).unwrap();
        let entry = config_entry_from_pair(pair).unwrap();
        assert_eq!(entry.value, "");
    }

    #[test]
    fn test_invalid_base64_is_a_registry_error() {
        let pair = KvPair { key: "service/payments/public".into(), value: Some("%%%".into()) };
        let err = config_entry_from_pair(pair).unwrap_err();
        assert!(err.to_string().contains("service/payments/public"));
    }

    #[test]
    fn test_health_record_from_service_entry() {
        let entry: ServiceEntry = serde_json::from_str(
            r#"{
                "Node": {
                    "ID": "40e4a748-2192-161a-0510-9bf59fe950b5",
                    "Node": "ip-10-0-0-5",
                    "Datacenter": "dc1",
                    "TaggedAddresses": {"lan": "10.0.0.5", "wan": "203.0.113.5"}
                },
                "Service": {
                    "Address": "10.0.0.5",
                    "Port": 8080,
                    "Tags": ["primary"]
                }
            }"#,
        )
        .unwrap();

        let record = HealthRecord::from(entry);
        assert_eq!(record.node_id, "40e4a748-2192-161a-0510-9bf59fe950b5");
        assert_eq!(record.node_name, "ip-10-0-0-5");
        assert_eq!(record.datacenter, "dc1");
        assert_eq!(record.tags, vec!["primary"]);
        assert_eq!(record.service_address, "10.0.0.5");
        assert_eq!(record.port, 8080);
        assert_eq!(record.wan_address(), Some("203.0.113.5"));
    }

    #[test]
    fn test_null_tags_and_addresses_tolerated() {
        let entry: ServiceEntry = serde_json::from_str(
            r#"{
                "Node": {"ID": "n", "Node": "n1", "Datacenter": "dc1", "TaggedAddresses": null},
                "Service": {"Address": "", "Port": 0, "Tags": null}
            }"#,
        )
        .unwrap();

        let record = HealthRecord::from(entry);
        assert!(record.tags.is_empty());
        assert!(record.tagged_addresses.is_empty());
        assert_eq!(record.port, 0);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let registry = ConsulRegistry::with_base_url("http://127.0.0.1:8500/").unwrap();
        assert_eq!(registry.base_url, "http://127.0.0.1:8500");
    }
}
