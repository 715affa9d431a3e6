//! Envoy xDS translation and serving
//!
//! Turns registry state into Envoy v3 resources and serves them over the
//! aggregated discovery service:
//! - [`snapshot::build_snapshot`] performs the one-pass translation
//! - [`cache::SnapshotCache`] holds the result per node group
//! - [`ads`] streams cached resources to connected clients

pub mod ads;
pub mod cache;
pub mod resources;
pub mod snapshot;

pub use ads::{start_ads_server, AdsService};
pub use cache::{SnapshotCache, DEFAULT_NODE_GROUP};
pub use resources::BuiltResource;
pub use snapshot::{build_snapshot, BuildContext, Snapshot, SNAPSHOT_VERSION};
