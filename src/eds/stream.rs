//! Per-connection stream protocol handler.
//!
//! # Data Flow
//! ```text
//! inbound stream ──► pump task ──► relay (1 slot) ──┐
//!                                                    ├─► event loop ──► outbound responses
//! registry / push-all ──► wake signal (1 slot) ─────┘
//! ```
//!
//! The event loop is the only owner of the connection's mutable state (node id,
//! watched clusters, protocol state). Everything else reaches it as a message.

use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::eds::connection::{Connection, WakeReceiver};
use crate::eds::protocol::{DiscoveryRequest, DiscoveryResponse};
use crate::eds::server::EndpointDiscoveryServer;
use crate::error::{DiscoveryError, Result, StreamError};
use crate::observability::metrics;

/// Inbound item as delivered by a transport.
pub type Inbound = std::result::Result<DiscoveryRequest, StreamError>;

/// Protocol state of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Stream open, event loop not yet running.
    Connecting,
    /// Waiting for a request naming at least one cluster.
    AwaitingFirstRequest,
    /// Registered for a non-empty set of clusters.
    Subscribed,
    /// Terminal.
    Closed,
}

enum Event {
    Request(Option<Inbound>),
    Wake,
}

pub(crate) struct StreamHandler<'a> {
    server: &'a EndpointDiscoveryServer,
    conn: Arc<Connection>,
    wake_rx: WakeReceiver,
    outbound: mpsc::Sender<DiscoveryResponse>,
    node_id: Option<String>,
    clusters: Vec<String>,
    state: StreamState,
}

impl<'a> StreamHandler<'a> {
    pub(crate) fn new(
        server: &'a EndpointDiscoveryServer,
        peer_addr: String,
        outbound: mpsc::Sender<DiscoveryResponse>,
    ) -> Self {
        let (conn, wake_rx) = Connection::new(peer_addr);
        metrics::connection_opened();
        Self {
            server,
            conn,
            wake_rx,
            outbound,
            node_id: None,
            clusters: Vec::new(),
            state: StreamState::Connecting,
        }
    }

    pub(crate) async fn run<S>(mut self, inbound: S) -> Result<()>
    where
        S: Stream<Item = Inbound> + Send + Unpin + 'static,
    {
        let (relay_tx, mut relay_rx) = mpsc::channel(1);
        let pump = tokio::spawn(pump_requests(inbound, relay_tx));
        self.state = StreamState::AwaitingFirstRequest;

        let result = self.event_loop(&mut relay_rx).await;
        pump.abort();

        match &result {
            Ok(()) => tracing::debug!(
                node = ?self.node_id,
                peer = %self.conn.peer_addr(),
                "Stream closed"
            ),
            Err(e) => tracing::warn!(
                node = ?self.node_id,
                peer = %self.conn.peer_addr(),
                error = %e,
                "Stream terminated with error"
            ),
        }
        self.close();
        result
    }

    async fn event_loop(&mut self, relay_rx: &mut mpsc::Receiver<Inbound>) -> Result<()> {
        loop {
            let event = tokio::select! {
                msg = relay_rx.recv() => Event::Request(msg),
                Some(()) = self.wake_rx.recv() => Event::Wake,
            };

            match event {
                // Relay closed: the peer finished the stream.
                Event::Request(None) => return Ok(()),
                Event::Request(Some(Err(e))) if e.is_clean_close() => return Ok(()),
                Event::Request(Some(Err(e))) => return Err(e.into()),
                Event::Request(Some(Ok(req))) => {
                    if !self.on_request(req) {
                        continue;
                    }
                }
                Event::Wake => {
                    tracing::trace!(node = ?self.node_id, "Wake signal");
                }
            }

            if !self.clusters.is_empty() {
                self.push().await?;
            }
        }
    }

    /// Apply an inbound request. Returns true if a response should follow.
    fn on_request(&mut self, mut req: DiscoveryRequest) -> bool {
        req.resource_names = dedup_preserving_order(req.resource_names);
        let node = match &self.node_id {
            Some(node) => node.clone(),
            None => {
                let node = self.server.node_ids().next(req.node_id());
                self.node_id = Some(node.clone());
                node
            }
        };
        let debug = self.server.debug_enabled();

        if self.state == StreamState::Subscribed && req.resource_names.len() > self.clusters.len() {
            tracing::info!(
                node = %node,
                from = ?self.clusters,
                to = ?req.resource_names,
                "Client now monitors more clusters, re-subscribing"
            );
            self.state = StreamState::AwaitingFirstRequest;
        }

        if self.state == StreamState::Subscribed {
            // Acknowledgements never drive state: the server always serves its
            // current view, whatever version the client reports.
            if let Some(detail) = &req.error_detail {
                tracing::warn!(
                    node = %node,
                    peer = %self.conn.peer_addr(),
                    version = %req.version_info,
                    code = detail.code,
                    message = %detail.message,
                    "ACK ERROR"
                );
            }
            if debug {
                tracing::info!(
                    node = %node,
                    version = %req.version_info,
                    nonce = %req.response_nonce,
                    clusters = ?self.clusters,
                    "ACK"
                );
            }
            return false;
        }

        if debug {
            tracing::info!(
                node = %node,
                peer = %self.conn.peer_addr(),
                clusters = ?req.resource_names,
                "REQ"
            );
        }
        self.subscribe(&node, req.resource_names);
        true
    }

    /// Replace the watched set and update the registry to match.
    fn subscribe(&mut self, node: &str, clusters: Vec<String>) {
        let cache = self.server.cache();
        let previous = std::mem::replace(&mut self.clusters, clusters);
        for old in previous.iter().filter(|c| !self.clusters.contains(c)) {
            cache.deregister(old, node, &self.conn);
        }
        for cluster in &self.clusters {
            cache.register(cluster, node, &self.conn);
        }
        self.conn.publish(node, &self.clusters);

        self.state = if self.clusters.is_empty() {
            StreamState::AwaitingFirstRequest
        } else {
            StreamState::Subscribed
        };
    }

    async fn push(&mut self) -> Result<()> {
        let response = self.server.endpoints(&self.clusters)?;
        let resources = response.resources.len();
        if self.server.debug_enabled() {
            tracing::info!(
                node = ?self.node_id,
                peer = %self.conn.peer_addr(),
                clusters = ?self.clusters,
                version = %response.version_info,
                resources,
                "PUSH"
            );
        }
        self.outbound
            .send(response)
            .await
            .map_err(|e| DiscoveryError::Send(e.to_string()))?;
        metrics::record_push();
        Ok(())
    }

    /// Deregister from every watched cluster. Idempotent.
    fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        if let Some(node) = &self.node_id {
            let cache = self.server.cache();
            for cluster in &self.clusters {
                cache.deregister(cluster, node, &self.conn);
            }
        }
        self.state = StreamState::Closed;
        metrics::connection_closed();
    }
}

impl Drop for StreamHandler<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drop repeated cluster names, keeping the first occurrence of each.
fn dedup_preserving_order(names: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(names.len());
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Forward inbound messages into the single-slot relay until the stream ends.
async fn pump_requests<S>(mut inbound: S, relay: mpsc::Sender<Inbound>)
where
    S: Stream<Item = Inbound> + Send + Unpin + 'static,
{
    while let Some(item) = inbound.next().await {
        let failed = item.is_err();
        if relay.send(item).await.is_err() || failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserving_order() {
        let names = ["b", "a", "b", "c", "a"].map(String::from).to_vec();
        assert_eq!(dedup_preserving_order(names), vec!["b", "a", "c"]);
        assert!(dedup_preserving_order(Vec::new()).is_empty());
    }
}
