//! Watcher connections.
//!
//! # Responsibilities
//! - Identify each stream with a unique node id
//! - Carry the single-slot wake signal used for pushes
//! - Expose a read-only view of the watched clusters for debugging

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Node id used when a client does not declare one.
pub const UNKNOWN_NODE: &str = "unknown";

/// Generates node ids that stay unique across repeated client ids.
#[derive(Debug, Default)]
pub struct NodeIdGenerator {
    counter: AtomicU64,
}

impl NodeIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine the client-declared id with the next connection number.
    pub fn next(&self, raw: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let raw = if raw.is_empty() { UNKNOWN_NODE } else { raw };
        format!("{raw}-{n}")
    }
}

/// Receiving half of a connection's wake signal.
pub type WakeReceiver = mpsc::Receiver<()>;

/// One streaming client.
///
/// Owned by its stream handler; cluster records only hold references and compare
/// them by pointer identity.
#[derive(Debug)]
pub struct Connection {
    peer_addr: String,
    connected_at: SystemTime,
    wake_tx: mpsc::Sender<()>,
    node_id: ArcSwap<String>,
    clusters: ArcSwap<Vec<String>>,
}

impl Connection {
    /// Create a connection and the receiver for its wake signal (capacity 1).
    pub fn new(peer_addr: impl Into<String>) -> (Arc<Self>, WakeReceiver) {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let conn = Arc::new(Self {
            peer_addr: peer_addr.into(),
            connected_at: SystemTime::now(),
            wake_tx,
            node_id: ArcSwap::from_pointee(String::new()),
            clusters: ArcSwap::from_pointee(Vec::new()),
        });
        (conn, wake_rx)
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn node_id(&self) -> Arc<String> {
        self.node_id.load_full()
    }

    /// Clusters currently watched, as last published by the stream handler.
    pub fn clusters(&self) -> Arc<Vec<String>> {
        self.clusters.load_full()
    }

    pub(crate) fn publish(&self, node_id: &str, clusters: &[String]) {
        self.node_id.store(Arc::new(node_id.to_string()));
        self.clusters.store(Arc::new(clusters.to_vec()));
    }

    /// Signal the stream handler to push current state.
    ///
    /// Never blocks: a pending signal already guarantees a push that reads the
    /// latest state. Returns false if the signal was coalesced or the handler is gone.
    pub fn wake(&self) -> bool {
        self.wake_tx.try_send(()).is_ok()
    }

    /// Debug view of this connection.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            node_id: self.node_id().to_string(),
            peer_addr: self.peer_addr.clone(),
            clusters: self.clusters().to_vec(),
            connected_at_ms: unix_millis(self.connected_at),
        }
    }
}

/// Serializable view of a [`Connection`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub node_id: String,
    pub peer_addr: String,
    pub clusters: Vec<String>,
    pub connected_at_ms: u64,
}

pub(crate) fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
