//! # Catalogplane
//!
//! Catalogplane is a small Envoy control plane that translates a Consul-style
//! service registry — the service catalog, passing health records, and a
//! key/value configuration tree — into a versioned xDS snapshot served over
//! the aggregated discovery service (ADS).
//!
//! ## Architecture
//!
//! ```text
//! Consul HTTP API → Snapshot Builder → Snapshot Cache → xDS gRPC Server → Envoy
//!       ↓                  ↓                 ↓
//! Registry Client    Resource Builders   Update Broadcast
//! ```
//!
//! ## Core Components
//!
//! - **Registry Client**: Reqwest-based client for the catalog, KV, and
//!   health endpoints, behind the read-only [`registry::ServiceRegistry`] trait
//! - **Snapshot Builder**: One-pass translation of registry state into
//!   clusters, load assignments, and route tables
//! - **Snapshot Cache**: Wholesale-replacement store keyed by node group,
//!   with update notifications for long-lived streams
//! - **xDS Server**: Tonic-based gRPC server implementing the Envoy
//!   aggregated discovery protocol
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use catalogplane::registry::ConsulRegistry;
//! use catalogplane::xds::{build_snapshot, BuildContext, SnapshotCache, DEFAULT_NODE_GROUP};
//! use catalogplane::{Config, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let registry = ConsulRegistry::new(&config.registry)?;
//!     let context = BuildContext::from_config(&config);
//!     let snapshot = build_snapshot(&registry, &context).await?;
//!
//!     let cache = Arc::new(SnapshotCache::new());
//!     cache.set_snapshot(DEFAULT_NODE_GROUP, snapshot).await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod xds;

// Re-export commonly used types and traits
pub use config::Config;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "catalogplane");
    }
}
