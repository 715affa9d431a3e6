//! Snapshot assembly.
//!
//! One build is a single pass over the registry: list the catalog, pull
//! the configuration tree once, then per service collect admitted
//! endpoints and resolve routable domains per filter category. The result
//! is an immutable versioned snapshot that replaces the previous one
//! wholesale.

use std::collections::HashMap;

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::{ClusterLoadAssignment, LbEndpoint};
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::{RouteConfiguration, VirtualHost};
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::Result;
use crate::registry::{paths, ConfigEntry, ServiceRegistry};
use crate::xds::resources::{
    self, BuiltResource, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};

/// Version tag attached to every snapshot
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Filter category whose virtual hosts always receive a synthesized
/// `<service>.internal` domain
const PRIVATE_FILTER: &str = "private";

/// Everything one build needs to know about its configuration scope
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Configuration-tree namespace the entries are read from
    pub namespace: String,
    /// Filter categories, in route-table emission order
    pub filters: Vec<String>,
    /// Health filter name: partitions the tree but never builds routes
    pub health_filter: String,
}

impl BuildContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.namespace.clone(),
            filters: config.filters.clone(),
            health_filter: config.health_filter.clone(),
        }
    }

    /// Filters used for partitioning: the configured categories plus the
    /// health filter
    fn partition_filters(&self) -> Vec<String> {
        let mut filters = self.filters.clone();
        filters.push(self.health_filter.clone());
        filters
    }
}

/// One complete point-in-time configuration
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: String,
    pub clusters: Vec<Cluster>,
    pub load_assignments: Vec<ClusterLoadAssignment>,
    pub route_tables: Vec<RouteConfiguration>,
    /// Reserved; always empty for now
    pub listeners: Vec<Listener>,
}

impl Snapshot {
    /// Snapshot with no resources, served until the first build lands
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            clusters: Vec::new(),
            load_assignments: Vec::new(),
            route_tables: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Encodes the resources of one type for the wire. Unknown type URLs
    /// yield no resources.
    pub fn resources_for(&self, type_url: &str) -> Vec<BuiltResource> {
        match type_url {
            CLUSTER_TYPE_URL => self
                .clusters
                .iter()
                .map(|cluster| {
                    BuiltResource::encode(cluster.name.clone(), CLUSTER_TYPE_URL, cluster)
                })
                .collect(),
            ENDPOINT_TYPE_URL => self
                .load_assignments
                .iter()
                .map(|assignment| {
                    BuiltResource::encode(
                        assignment.cluster_name.clone(),
                        ENDPOINT_TYPE_URL,
                        assignment,
                    )
                })
                .collect(),
            ROUTE_TYPE_URL => self
                .route_tables
                .iter()
                .map(|table| BuiltResource::encode(table.name.clone(), ROUTE_TYPE_URL, table))
                .collect(),
            LISTENER_TYPE_URL => self
                .listeners
                .iter()
                .map(|listener| {
                    BuiltResource::encode(listener.name.clone(), LISTENER_TYPE_URL, listener)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Builds one snapshot from a point-in-time read of the registry.
///
/// Any registry read failure aborts the build and surfaces as an error, so
/// the caller keeps serving the previously installed snapshot instead of a
/// partial one. Per-instance and per-value problems are logged and
/// excluded without aborting. Services are processed in name order, so a
/// given registry state always yields the same snapshot.
pub async fn build_snapshot(
    registry: &dyn ServiceRegistry,
    context: &BuildContext,
) -> Result<Snapshot> {
    info!(namespace = %context.namespace, "Building snapshot");

    let mut services = registry.list_services().await?;
    services.sort();
    let entries = registry.list_config_entries(&context.namespace).await?;
    let buckets = paths::partition_by_filter(&entries, &context.partition_filters());

    let mut clusters = Vec::with_capacity(services.len());
    let mut load_assignments = Vec::new();
    let mut hosts_per_filter: HashMap<String, Vec<VirtualHost>> = HashMap::new();

    for service in &services {
        debug!(service = %service, "Discovered service");
        clusters.push(resources::cluster_for_service(service));

        let records = registry.healthy_instances(service).await?;
        let endpoints: Vec<LbEndpoint> = records
            .iter()
            .filter_map(|record| resources::endpoint_from_record(service, record))
            .collect();
        if !endpoints.is_empty() {
            load_assignments.push(resources::load_assignment_for_service(service, endpoints));
        }

        for filter in &context.filters {
            let bucket = buckets.get(filter).map(Vec::as_slice).unwrap_or(&[]);
            let scoped = paths::entries_for_service(bucket, service);
            let domains = resolve_domains(service, filter, &scoped);
            if !domains.is_empty() {
                debug!(
                    service = %service,
                    filter = %filter,
                    domains = ?domains,
                    "Adding virtual host"
                );
                hosts_per_filter
                    .entry(filter.clone())
                    .or_default()
                    .push(resources::virtual_host_for_service(service, filter, domains));
            }
        }
    }

    // Tables are emitted once per filter after the full pass, in configured
    // order; a filter that produced no virtual hosts gets no table.
    let mut route_tables = Vec::new();
    for filter in &context.filters {
        if let Some(hosts) = hosts_per_filter.remove(filter) {
            route_tables.push(resources::route_table_for_filter(filter, hosts));
        }
    }

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        clusters,
        load_assignments,
        route_tables,
        listeners: Vec::new(),
    };

    info!(
        clusters = snapshot.clusters.len(),
        load_assignments = snapshot.load_assignments.len(),
        route_tables = snapshot.route_tables.len(),
        "Snapshot build complete"
    );

    Ok(snapshot)
}

/// Collects the routable domains for one (service, filter) pair.
///
/// The private category always contributes a synthesized
/// `<service>.internal` domain first; configuration values follow in entry
/// order. A value containing whitespace is not a domain and is skipped, as
/// is an empty value.
fn resolve_domains(service: &str, filter: &str, entries: &[&ConfigEntry]) -> Vec<String> {
    let mut domains = Vec::new();
    if filter == PRIVATE_FILTER {
        domains.push(format!("{service}.internal"));
    }
    for entry in entries {
        if entry.value.is_empty() || entry.value.contains(char::is_whitespace) {
            debug!(
                key = %entry.key,
                value = %entry.value,
                "Ignoring configuration value that is not a usable domain"
            );
            continue;
        }
        domains.push(entry.value.clone());
    }
    domains
}
