//! Endpoint discovery service.
//!
//! Owns the cluster cache, the node id generator and the runtime debug flag.
//! Transports hand each accepted stream to [`EndpointDiscoveryServer::stream_endpoints`].

use futures_util::Stream;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::eds::cache::{ClusterCache, ClusterRecordInfo};
use crate::eds::connection::NodeIdGenerator;
use crate::eds::protocol::{DiscoveryRequest, DiscoveryResponse};
use crate::eds::push::{self, PushSummary};
use crate::eds::resolver::EndpointResolver;
use crate::eds::stream::{Inbound, StreamHandler};
use crate::error::{DiscoveryError, Result};

pub struct EndpointDiscoveryServer {
    cache: ClusterCache,
    node_ids: NodeIdGenerator,
    debug: AtomicBool,
}

impl EndpointDiscoveryServer {
    /// Server with an empty cache. `debug` is the initial protocol logging flag.
    pub fn new(resolver: EndpointResolver, debug: bool) -> Self {
        Self {
            cache: ClusterCache::new(resolver),
            node_ids: NodeIdGenerator::new(),
            debug: AtomicBool::new(debug),
        }
    }

    /// Cluster cache and connection registry.
    pub fn cache(&self) -> &ClusterCache {
        &self.cache
    }

    pub(crate) fn node_ids(&self) -> &NodeIdGenerator {
        &self.node_ids
    }

    /// Whether verbose per-request/response logging is on.
    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Turn verbose per-request/response logging on or off.
    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "Discovery debug logging toggled");
    }

    /// Serve one bidirectional discovery stream until it ends.
    ///
    /// End of stream and cancellation return `Ok`; any other transport error is
    /// returned. The connection is deregistered from every cluster either way.
    pub async fn stream_endpoints<S>(
        &self,
        peer_addr: impl Into<String>,
        inbound: S,
        outbound: mpsc::Sender<DiscoveryResponse>,
    ) -> Result<()>
    where
        S: Stream<Item = Inbound> + Send + Unpin + 'static,
    {
        StreamHandler::new(self, peer_addr.into(), outbound)
            .run(inbound)
            .await
    }

    /// One-shot fetch. Not implemented.
    pub async fn fetch_endpoints(&self, _request: DiscoveryRequest) -> Result<DiscoveryResponse> {
        Err(DiscoveryError::NotImplemented)
    }

    /// Load statistics reporting. Unsupported.
    pub async fn stream_load_stats<S>(&self, _inbound: S) -> Result<()>
    where
        S: Stream<Item = Inbound> + Send + Unpin,
    {
        Err(DiscoveryError::Unsupported)
    }

    /// Response for `clusters`. Clusters without a snapshot are left out.
    pub fn endpoints(&self, clusters: &[String]) -> Result<DiscoveryResponse> {
        let assignments: Vec<_> = clusters
            .iter()
            .filter_map(|cluster| self.cache.assignment(cluster))
            .collect();
        DiscoveryResponse::endpoints(assignments.iter().map(Arc::as_ref))
    }

    /// Recompute every cached cluster and wake its watchers.
    ///
    /// Resolution runs inline; async callers use [`Self::push_all_blocking`].
    pub fn push_all(&self) -> PushSummary {
        push::push_all(&self.cache)
    }

    /// [`Self::push_all`] on the blocking pool, keeping registry calls off the runtime workers.
    pub async fn push_all_blocking(self: &Arc<Self>) -> std::result::Result<PushSummary, JoinError> {
        let server = Arc::clone(self);
        tokio::task::spawn_blocking(move || server.push_all()).await
    }

    /// Debug dump of the cluster cache.
    pub fn debug_snapshot(&self) -> BTreeMap<String, ClusterRecordInfo> {
        self.cache.dump()
    }
}
