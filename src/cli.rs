//! # Command Line Interface
//!
//! Flags for the catalogplane server binary. Every option falls back to an
//! environment variable and then to a built-in default; resolution order is
//! flag > environment > default (see `config`).

use clap::Parser;

use crate::config::{parse_filters, Config};

#[derive(Parser, Debug)]
#[command(name = "catalogplane")]
#[command(about = "Translates a Consul service catalog into Envoy xDS configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable DEBUG logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Consul address as host:port, e.g. '127.0.0.1:8500' [env: CONSUL_URL]
    #[arg(short = 'u', long, value_name = "HOST:PORT")]
    pub consul_url: Option<String>,

    /// Talk to the Consul API over SSL [env: CONSUL_SSL]
    #[arg(short = 's', long)]
    pub consul_ssl: bool,

    /// Consul KV namespace to look for services configuration [env: SERVICES_NAMESPACE]
    #[arg(short = 'n', long, value_name = "NAMESPACE")]
    pub services_namespace: Option<String>,

    /// Comma-separated keys where to look for services configuration [env: SERVICE_FILTERS]
    #[arg(short = 'f', long, value_name = "LIST")]
    pub service_filters: Option<String>,

    /// Name of the key holding the services health configuration [env: SERVICES_HEALTH]
    #[arg(long, value_name = "NAME")]
    pub services_health: Option<String>,

    /// Address on which to serve the Envoy xDS API, e.g. '0.0.0.0:50000' [env: XDS_ADDR]
    #[arg(short = 'x', long, value_name = "ADDR")]
    pub xds_addr: Option<String>,
}

impl Cli {
    /// Overlay explicit flags on an environment-derived configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.consul_url {
            config.registry.host = host.clone();
        }
        if self.consul_ssl {
            config.registry.use_ssl = true;
        }
        if let Some(namespace) = &self.services_namespace {
            config.namespace = namespace.clone();
        }
        if let Some(filters) = &self.service_filters {
            config.filters = parse_filters(filters);
        }
        if let Some(health) = &self.services_health {
            config.health_filter = health.clone();
        }
        if let Some(addr) = &self.xds_addr {
            config.xds_addr = addr.clone();
        }
    }
}
