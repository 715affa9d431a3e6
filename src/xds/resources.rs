//! Envoy resource construction from registry data.
//!
//! Each builder turns one piece of registry state into the corresponding
//! Envoy v3 protobuf: a health record becomes an endpoint, a service name
//! becomes an EDS cluster, resolved domains become a virtual host. The
//! endpoint admission rule lives here too: a record with no usable port or
//! no externally reachable address is dropped with a warning before it
//! ever becomes an endpoint.

use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType, EdsClusterConfig,
};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::core::v3::{
    config_source::ConfigSourceSpecifier,
    socket_address::{self, Protocol},
    Address, AggregatedConfigSource, ConfigSource, HealthStatus, Metadata, SocketAddress,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints,
};
use envoy_types::pb::envoy::config::route::v3::{
    route::Action, route_action::ClusterSpecifier, route_match::PathSpecifier, Route,
    RouteAction, RouteConfiguration, RouteMatch, VirtualHost,
};
use envoy_types::pb::google::protobuf::value::Kind;
use envoy_types::pb::google::protobuf::{Any, Duration, ListValue, Struct, Value};
use prost::Message;
use tracing::warn;

use crate::registry::HealthRecord;

pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";

/// Filter-metadata key Envoy's load balancers read endpoint attributes from
pub const LB_METADATA_KEY: &str = "envoy.lb";

/// Wrapper for a built Envoy resource along with its name.
#[derive(Clone, Debug)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    /// Encodes `message` into an [`Any`] under the given type URL
    pub fn encode<M: Message>(name: impl Into<String>, type_url: &str, message: &M) -> Self {
        Self {
            name: name.into(),
            resource: Any { type_url: type_url.to_string(), value: message.encode_to_vec() },
        }
    }

    pub fn into_any(self) -> Any {
        self.resource
    }

    pub fn type_url(&self) -> &str {
        &self.resource.type_url
    }
}

/// Load-balancer metadata carried by one endpoint under the `envoy.lb`
/// filter key.
///
/// Node identity, node name, and datacenter are always written; the
/// remaining fields are written only when the registry supplied a value,
/// so consumers can distinguish "absent" from "empty".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMetadata {
    pub node_id: String,
    pub node_name: String,
    pub datacenter: String,
    pub tags: Option<Vec<String>>,
    pub service_address: Option<String>,
    pub lan_address: Option<String>,
    pub wan_address: Option<String>,
}

impl EndpointMetadata {
    pub fn from_record(record: &HealthRecord) -> Self {
        Self {
            node_id: record.node_id.clone(),
            node_name: record.node_name.clone(),
            datacenter: record.datacenter.clone(),
            tags: if record.tags.is_empty() { None } else { Some(record.tags.clone()) },
            service_address: if record.service_address.is_empty() {
                None
            } else {
                Some(record.service_address.clone())
            },
            lan_address: record.lan_address().map(str::to_string),
            wan_address: record.wan_address().map(str::to_string),
        }
    }

    fn into_envoy(self) -> Metadata {
        let mut lb = Struct::default();
        lb.fields.insert("node-id".to_string(), string_value(self.node_id));
        lb.fields.insert("node-name".to_string(), string_value(self.node_name));
        lb.fields.insert("datacenter".to_string(), string_value(self.datacenter));
        if let Some(tags) = self.tags {
            let values = tags.into_iter().map(string_value).collect();
            lb.fields.insert(
                "tags".to_string(),
                Value { kind: Some(Kind::ListValue(ListValue { values })) },
            );
        }
        if let Some(address) = self.service_address {
            lb.fields.insert("svc-address".to_string(), string_value(address));
        }
        if let Some(address) = self.lan_address {
            lb.fields.insert("lan-address".to_string(), string_value(address));
        }
        if let Some(address) = self.wan_address {
            lb.fields.insert("wan-address".to_string(), string_value(address));
        }

        let mut metadata = Metadata::default();
        metadata.filter_metadata.insert(LB_METADATA_KEY.to_string(), lb);
        metadata
    }
}

fn string_value(value: String) -> Value {
    Value { kind: Some(Kind::StringValue(value)) }
}

/// Converts one health record into an Envoy endpoint.
///
/// Returns `None` when the record fails admission. The registry only hands
/// over passing instances, so admitted endpoints carry a fixed healthy
/// status; what gets rejected here is an instance that cannot be routed to
/// at all. Rejection is logged and never aborts the build.
pub fn endpoint_from_record(service: &str, record: &HealthRecord) -> Option<LbEndpoint> {
    if record.port == 0 {
        warn!(
            service = %service,
            node = %record.node_name,
            "Skipping instance with no service port set"
        );
        return None;
    }
    let host = match record.wan_address() {
        Some(address) => address.to_string(),
        None => {
            warn!(
                service = %service,
                node = %record.node_name,
                "Skipping instance with no externally reachable address"
            );
            return None;
        }
    };

    let metadata = EndpointMetadata::from_record(record);

    Some(LbEndpoint {
        host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(Endpoint {
            address: Some(Address {
                address: Some(
                    envoy_types::pb::envoy::config::core::v3::address::Address::SocketAddress(
                        SocketAddress {
                            address: host,
                            port_specifier: Some(socket_address::PortSpecifier::PortValue(
                                record.port,
                            )),
                            protocol: Protocol::Tcp as i32,
                            ..Default::default()
                        },
                    ),
                ),
            }),
            ..Default::default()
        })),
        health_status: HealthStatus::Healthy as i32,
        metadata: Some(metadata.into_envoy()),
        ..Default::default()
    })
}

/// Builds the cluster for one discovered service.
///
/// Every service gets a cluster whether or not any instance passed
/// admission; membership is delivered separately through EDS over the same
/// aggregated stream, so an instance-less service shows up as an empty
/// cluster rather than a missing one.
pub fn cluster_for_service(service: &str) -> Cluster {
    Cluster {
        name: service.to_string(),
        connect_timeout: Some(Duration { seconds: 5, nanos: 0 }),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: Some(EdsClusterConfig {
            eds_config: Some(ConfigSource {
                config_source_specifier: Some(ConfigSourceSpecifier::Ads(
                    AggregatedConfigSource::default(),
                )),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Binds the admitted endpoints for one service to its cluster name
pub fn load_assignment_for_service(
    service: &str,
    endpoints: Vec<LbEndpoint>,
) -> ClusterLoadAssignment {
    ClusterLoadAssignment {
        cluster_name: service.to_string(),
        endpoints: vec![LocalityLbEndpoints { lb_endpoints: endpoints, ..Default::default() }],
        ..Default::default()
    }
}

/// Builds the `<service>-<filter>` virtual host: every listed domain is
/// routed to the service's cluster through a single `/` prefix match.
pub fn virtual_host_for_service(service: &str, filter: &str, domains: Vec<String>) -> VirtualHost {
    VirtualHost {
        name: format!("{service}-{filter}"),
        domains,
        routes: vec![Route {
            r#match: Some(RouteMatch {
                path_specifier: Some(PathSpecifier::Prefix("/".to_string())),
                ..Default::default()
            }),
            action: Some(Action::Route(RouteAction {
                cluster_specifier: Some(ClusterSpecifier::Cluster(service.to_string())),
                ..Default::default()
            })),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Builds the route table for one filter category, named after the filter
pub fn route_table_for_filter(filter: &str, virtual_hosts: Vec<VirtualHost>) -> RouteConfiguration {
    RouteConfiguration { name: filter.to_string(), virtual_hosts, ..Default::default() }
}
