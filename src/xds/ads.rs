//! Aggregated discovery service over the state-of-the-world protocol.
//!
//! One bidirectional stream carries every resource type. Each request is
//! answered in full from the cached snapshot; acknowledgements are
//! detected by a matching version and nonce and skipped rather than
//! re-answered; a snapshot replacement pushes fresh responses for every
//! type the client has subscribed to. The incremental (delta) variant is
//! not supported.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::{
        AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
    },
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tonic::{transport::Server, Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

use crate::errors::{Error, Result};
use crate::xds::cache::{SnapshotCache, DEFAULT_NODE_GROUP};
use crate::xds::resources::{
    BuiltResource, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL,
};

/// Last version and nonce sent on a stream per type URL, for ACK detection
struct LastResponse {
    version: String,
    nonce: String,
}

/// ADS implementation backed by the shared snapshot cache
#[derive(Clone)]
pub struct AdsService {
    cache: Arc<SnapshotCache>,
}

impl AdsService {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }

    /// Answers one discovery request in full from the current snapshot
    async fn build_response(&self, request: &DiscoveryRequest) -> DiscoveryResponse {
        let (version, resources) = match self.cache.snapshot(DEFAULT_NODE_GROUP).await {
            Some(snapshot) => {
                let built = match request.type_url.as_str() {
                    CLUSTER_TYPE_URL | ENDPOINT_TYPE_URL | ROUTE_TYPE_URL | LISTENER_TYPE_URL => {
                        snapshot.resources_for(&request.type_url)
                    }
                    other => {
                        warn!(type_url = %other, "Unknown resource type requested");
                        Vec::new()
                    }
                };
                let resources = built.into_iter().map(BuiltResource::into_any).collect();
                (snapshot.version.clone(), resources)
            }
            None => (String::new(), Vec::new()),
        };

        DiscoveryResponse {
            version_info: version,
            resources,
            type_url: request.type_url.clone(),
            nonce: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    async fn current_version(&self) -> String {
        self.cache
            .snapshot(DEFAULT_NODE_GROUP)
            .await
            .map(|snapshot| snapshot.version.clone())
            .unwrap_or_default()
    }
}

/// True when the request merely acknowledges the response we last sent for
/// its type: the nonce and version match, nothing was rejected, and the
/// cache has not moved past the acknowledged version in the meantime.
fn is_acknowledgement(
    request: &DiscoveryRequest,
    last: Option<&LastResponse>,
    current_version: &str,
) -> bool {
    match last {
        Some(sent) => {
            !request.response_nonce.is_empty()
                && request.response_nonce == sent.nonce
                && request.version_info == sent.version
                && request.error_detail.is_none()
                && sent.version == current_version
        }
        None => false,
    }
}

/// Runs the SOTW loop for one client stream.
///
/// The loop multiplexes three event sources: discovery requests from the
/// client, snapshot replacement announcements from the cache, and process
/// shutdown. All per-stream state (subscribed types, last sent
/// version/nonce) lives inside the task.
fn run_stream_loop(
    service: AdsService,
    mut in_stream: Streaming<DiscoveryRequest>,
) -> ReceiverStream<std::result::Result<DiscoveryResponse, Status>> {
    let (tx, rx) = mpsc::channel(100);
    let mut updates = service.cache.subscribe();

    tokio::spawn(async move {
        let mut last_sent: HashMap<String, LastResponse> = HashMap::new();
        let mut subscribed: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                result = in_stream.next() => {
                    match result {
                        Some(Ok(request)) => {
                            info!(
                                type_url = %request.type_url,
                                version_info = %request.version_info,
                                node_id = ?request.node.as_ref().map(|n| &n.id),
                                "Received discovery request"
                            );

                            if let Some(error_detail) = request.error_detail.as_ref() {
                                warn!(
                                    type_url = %request.type_url,
                                    nonce = %request.response_nonce,
                                    error_code = error_detail.code,
                                    error_message = %error_detail.message,
                                    "Envoy rejected previous response"
                                );
                            }

                            subscribed.insert(request.type_url.clone());

                            let current_version = service.current_version().await;
                            if is_acknowledgement(
                                &request,
                                last_sent.get(&request.type_url),
                                &current_version,
                            ) {
                                debug!(
                                    type_url = %request.type_url,
                                    version = %request.version_info,
                                    nonce = %request.response_nonce,
                                    "Acknowledged; nothing new to send"
                                );
                                continue;
                            }

                            let response = service.build_response(&request).await;
                            if !record_and_send(&tx, &mut last_sent, response).await {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Error receiving discovery request: {}", e);
                            let _ = tx.send(Err(e)).await;
                            break;
                        }
                        None => {
                            info!("ADS stream ended by client");
                            break;
                        }
                    }
                }
                update = updates.recv() => {
                    match update {
                        Ok(node_group) => {
                            if node_group != DEFAULT_NODE_GROUP || subscribed.is_empty() {
                                continue;
                            }
                            info!(
                                node_group = %node_group,
                                types = subscribed.len(),
                                "Snapshot replaced; pushing fresh responses"
                            );
                            for type_url in &subscribed {
                                let request = DiscoveryRequest {
                                    type_url: type_url.clone(),
                                    ..Default::default()
                                };
                                let response = service.build_response(&request).await;
                                if !record_and_send(&tx, &mut last_sent, response).await {
                                    return;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Missed snapshot update notifications");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("Snapshot update channel closed");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down ADS stream");
                    break;
                }
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Records the sent version/nonce for ACK detection and forwards the
/// response. Returns false when the client side is gone.
async fn record_and_send(
    tx: &mpsc::Sender<std::result::Result<DiscoveryResponse, Status>>,
    last_sent: &mut HashMap<String, LastResponse>,
    response: DiscoveryResponse,
) -> bool {
    info!(
        type_url = %response.type_url,
        version = %response.version_info,
        nonce = %response.nonce,
        resource_count = response.resources.len(),
        "Sending discovery response"
    );

    last_sent.insert(
        response.type_url.clone(),
        LastResponse { version: response.version_info.clone(), nonce: response.nonce.clone() },
    );

    if tx.send(Ok(response)).await.is_err() {
        error!("Discovery response receiver dropped");
        return false;
    }
    true
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for AdsService {
    type StreamAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;
    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        info!("New ADS stream connection established");

        let stream = run_stream_loop(self.clone(), request.into_inner());
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        // Snapshot distribution is state-of-the-world only; end the stream
        // immediately so clients fall back or disconnect.
        warn!("Delta ADS stream requested but not supported");

        let (_tx, rx) = mpsc::channel(1);
        let out_stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(out_stream) as Self::DeltaAggregatedResourcesStream))
    }
}

/// Starts the ADS gRPC server and blocks until `shutdown_signal` resolves
pub async fn start_ads_server<F>(
    bind_addr: &str,
    cache: Arc<SnapshotCache>,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = bind_addr
        .parse()
        .map_err(|e| Error::config(format!("Invalid xDS listen address '{bind_addr}': {e}")))?;

    let ads_service = AdsService::new(cache);

    let server = Server::builder()
        .add_service(AggregatedDiscoveryServiceServer::new(ads_service))
        .serve_with_shutdown(addr, shutdown_signal);

    info!(address = %addr, "xDS server listening");

    server.await.map_err(|e| {
        let message = e.to_string();
        if message.contains("Address already in use") || message.contains("bind") {
            Error::transport(format!("xDS server failed to bind to {addr}: address in use"))
        } else {
            Error::transport(format!("xDS server failed: {e}"))
        }
    })?;

    Ok(())
}
