use std::sync::Arc;

use catalogplane::cli::Cli;
use catalogplane::observability::{init_logging, log_config_info};
use catalogplane::registry::ConsulRegistry;
use catalogplane::xds::{
    build_snapshot, start_ads_server, BuildContext, Snapshot, SnapshotCache, DEFAULT_NODE_GROUP,
};
use catalogplane::{Config, Result, APP_NAME, VERSION};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting Consul-to-Envoy control plane");

    let mut config = Config::from_env()?;
    cli.apply_to(&mut config);
    log_config_info(&config);

    let cache = Arc::new(SnapshotCache::new());
    // Serve an empty configuration until the first build lands so early
    // clients get a response instead of an error.
    cache.set_snapshot(DEFAULT_NODE_GROUP, Snapshot::empty()).await;

    let registry = ConsulRegistry::new(&config.registry)?;
    let context = BuildContext::from_config(&config);

    match build_snapshot(&registry, &context).await {
        Ok(snapshot) => cache.set_snapshot(DEFAULT_NODE_GROUP, snapshot).await,
        Err(e) => {
            warn!(error = %e, "Snapshot build failed; keeping the previously installed snapshot");
        }
    }

    start_ads_server(&config.xds_addr, cache, async {
        signal::ctrl_c().await.expect("Failed to install CTRL+C signal handler");
        info!("Shutdown signal received for xDS server");
    })
    .await?;

    info!("Control plane shutdown completed");
    Ok(())
}
