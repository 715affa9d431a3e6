//! # Configuration Management
//!
//! Resolves the catalogplane configuration from environment variables on
//! top of built-in defaults; CLI flags override both at startup.

use crate::Result;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Registry (Consul) connection settings
    pub registry: RegistryConfig,
    /// KV namespace scoping the configuration tree
    pub namespace: String,
    /// Ordered filter category names; order defines route-table emission order
    pub filters: Vec<String>,
    /// Distinguished health filter name, excluded from route building
    pub health_filter: String,
    /// Listen address for the xDS gRPC server
    pub xds_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            namespace: "service".to_string(),
            filters: vec!["public".to_string(), "private".to_string()],
            health_filter: "health".to_string(),
            xds_addr: "0.0.0.0:50000".to_string(),
        }
    }
}

/// Registry connection configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Consul address as `host:port`, without a scheme
    pub host: String,
    /// Reach the registry over HTTPS instead of HTTP
    pub use_ssl: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1:8500".to_string(), use_ssl: false }
    }
}

impl RegistryConfig {
    /// Base URL for the registry HTTP API
    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.host.trim_end_matches('/'))
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let host = std::env::var("CONSUL_URL").unwrap_or(defaults.registry.host);
        let use_ssl = std::env::var("CONSUL_SSL")
            .map(|value| parse_bool(&value))
            .unwrap_or(defaults.registry.use_ssl);

        let namespace = std::env::var("SERVICES_NAMESPACE").unwrap_or(defaults.namespace);

        let filters = match std::env::var("SERVICE_FILTERS") {
            Ok(raw) => parse_filters(&raw),
            Err(_) => defaults.filters,
        };

        let health_filter = std::env::var("SERVICES_HEALTH").unwrap_or(defaults.health_filter);
        if health_filter.is_empty() {
            return Err(crate::Error::config("SERVICES_HEALTH must not be empty"));
        }

        let xds_addr = std::env::var("XDS_ADDR").unwrap_or(defaults.xds_addr);

        Ok(Self {
            registry: RegistryConfig { host, use_ssl },
            namespace,
            filters,
            health_filter,
            xds_addr,
        })
    }
}

/// Split a comma-separated filter list, dropping empty items.
///
/// An empty result is allowed: with no filter categories configured the
/// snapshot carries clusters and endpoints but no route tables.
pub fn parse_filters(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serialize tests that mutate shared process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in
            ["CONSUL_URL", "CONSUL_SSL", "SERVICES_NAMESPACE", "SERVICE_FILTERS", "SERVICES_HEALTH", "XDS_ADDR"]
        {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.registry.host, "127.0.0.1:8500");
        assert!(!config.registry.use_ssl);
        assert_eq!(config.namespace, "service");
        assert_eq!(config.filters, vec!["public".to_string(), "private".to_string()]);
        assert_eq!(config.health_filter, "health");
        assert_eq!(config.xds_addr, "0.0.0.0:50000");
    }

    #[test]
    fn test_base_url_scheme() {
        let plain = RegistryConfig { host: "consul.internal:8500".into(), use_ssl: false };
        assert_eq!(plain.base_url(), "http://consul.internal:8500");

        let tls = RegistryConfig { host: "consul.internal:8501".into(), use_ssl: true };
        assert_eq!(tls.base_url(), "https://consul.internal:8501");
    }

    #[test]
    fn test_config_from_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("CONSUL_URL", "10.1.2.3:8500");
        env::set_var("CONSUL_SSL", "true");
        env::set_var("SERVICES_NAMESPACE", "apps");
        env::set_var("SERVICE_FILTERS", "public, internal ,private");
        env::set_var("SERVICES_HEALTH", "checks");
        env::set_var("XDS_ADDR", "127.0.0.1:51000");

        let config = Config::from_env().unwrap();
        assert_eq!(config.registry.host, "10.1.2.3:8500");
        assert!(config.registry.use_ssl);
        assert_eq!(config.namespace, "apps");
        assert_eq!(
            config.filters,
            vec!["public".to_string(), "internal".to_string(), "private".to_string()]
        );
        assert_eq!(config.health_filter, "checks");
        assert_eq!(config.xds_addr, "127.0.0.1:51000");

        clear_env();
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.registry.host, "127.0.0.1:8500");
        assert_eq!(config.namespace, "service");
        assert_eq!(config.filters, vec!["public".to_string(), "private".to_string()]);
        assert_eq!(config.health_filter, "health");
        assert_eq!(config.xds_addr, "0.0.0.0:50000");
    }

    #[test]
    fn test_parse_filters_drops_empty_items() {
        assert_eq!(parse_filters("public,,private,"), vec!["public", "private"]);
        assert!(parse_filters("").is_empty());
        assert!(parse_filters(" , ").is_empty());
    }
}
