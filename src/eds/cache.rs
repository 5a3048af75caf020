//! Cluster cache and connection registry.
//!
//! # Responsibilities
//! - Map cluster keys to their records (get-or-create, eviction)
//! - Hold each cluster's latest assignment snapshot
//! - Track which connections watch each cluster
//!
//! # Locking
//! Two lock scopes: the cache lock guards which records exist, and each record's
//! own lock guards its assignment and watchers. When both are needed the cache
//! lock is taken first. Nobody holding a record lock ever waits on the cache
//! lock, and no resolver work runs under the cache lock.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::eds::connection::{unix_millis, Connection, ConnectionInfo};
use crate::eds::resolver::EndpointResolver;
use crate::model::Assignment;
use crate::observability::metrics;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct RecordState {
    assignment: Option<Arc<Assignment>>,
    first_use: SystemTime,
    first_non_empty: Option<SystemTime>,
    /// node id → active connection
    watchers: HashMap<String, Arc<Connection>>,
    /// Set once the record has been removed from the cache.
    evicted: bool,
}

/// Per-cluster state: last computed assignment and its watchers.
#[derive(Debug)]
pub struct ClusterRecord {
    state: Mutex<RecordState>,
}

impl ClusterRecord {
    fn new() -> Self {
        Self {
            state: Mutex::new(RecordState {
                assignment: None,
                first_use: SystemTime::now(),
                first_non_empty: None,
                watchers: HashMap::new(),
                evicted: false,
            }),
        }
    }

    /// Current snapshot, `None` until first computed.
    pub fn current_assignment(&self) -> Option<Arc<Assignment>> {
        lock(&self.state).assignment.clone()
    }

    /// When the record was created, i.e. when the cluster was first requested.
    pub fn first_use(&self) -> SystemTime {
        lock(&self.state).first_use
    }

    /// When an assignment with at least one locality group was first stored.
    pub fn first_non_empty(&self) -> Option<SystemTime> {
        lock(&self.state).first_non_empty
    }

    /// Number of connections watching this cluster.
    pub fn watcher_count(&self) -> usize {
        lock(&self.state).watchers.len()
    }

    /// Connection currently registered under `node_id`.
    pub fn watcher(&self, node_id: &str) -> Option<Arc<Connection>> {
        lock(&self.state).watchers.get(node_id).cloned()
    }

    fn store(&self, assignment: Assignment) {
        let mut state = lock(&self.state);
        if !assignment.is_empty() && state.first_non_empty.is_none() {
            state.first_non_empty = Some(SystemTime::now());
        }
        state.assignment = Some(Arc::new(assignment));
    }

    /// Insert `conn` under `node_id`, waking a different connection it replaces.
    /// Returns false if the record was already evicted.
    fn add_watcher(&self, cluster: &str, node_id: &str, conn: &Arc<Connection>) -> bool {
        let mut state = lock(&self.state);
        if state.evicted {
            return false;
        }
        if let Some(existing) = state.watchers.insert(node_id.to_string(), conn.clone()) {
            if !Arc::ptr_eq(&existing, conn) {
                tracing::debug!(
                    cluster = %cluster,
                    node = %node_id,
                    old_peer = %existing.peer_addr(),
                    new_peer = %conn.peer_addr(),
                    "Replacing watcher"
                );
                existing.wake();
            }
        }
        true
    }

    /// Wake every registered watcher. Returns how many signals were delivered.
    pub fn wake_all(&self) -> usize {
        let state = lock(&self.state);
        state.watchers.values().filter(|conn| conn.wake()).count()
    }

    fn info(&self) -> ClusterRecordInfo {
        let state = lock(&self.state);
        ClusterRecordInfo {
            load_assignment: state.assignment.as_deref().cloned(),
            first_use_ms: unix_millis(state.first_use),
            non_empty_ms: state.first_non_empty.map(unix_millis),
            watchers: state
                .watchers
                .iter()
                .map(|(node, conn)| (node.clone(), conn.info()))
                .collect(),
        }
    }
}

/// Serializable view of a [`ClusterRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct ClusterRecordInfo {
    pub load_assignment: Option<Assignment>,
    pub first_use_ms: u64,
    pub non_empty_ms: Option<u64>,
    pub watchers: BTreeMap<String, ConnectionInfo>,
}

/// Process-wide map from cluster key to [`ClusterRecord`].
pub struct ClusterCache {
    clusters: Mutex<HashMap<String, Arc<ClusterRecord>>>,
    resolver: EndpointResolver,
}

impl ClusterCache {
    /// Empty cache resolving clusters through `resolver`.
    pub fn new(resolver: EndpointResolver) -> Self {
        Self {
            clusters: Mutex::new(HashMap::new()),
            resolver,
        }
    }

    /// Existing record for `cluster`, or a fresh empty one.
    pub fn get_or_create(&self, cluster: &str) -> Arc<ClusterRecord> {
        let mut clusters = lock(&self.clusters);
        if let Some(record) = clusters.get(cluster) {
            return record.clone();
        }
        let record = Arc::new(ClusterRecord::new());
        clusters.insert(cluster.to_string(), record.clone());
        metrics::set_cluster_count(clusters.len());
        record
    }

    /// Existing record for `cluster`, without creating one.
    pub fn get(&self, cluster: &str) -> Option<Arc<ClusterRecord>> {
        lock(&self.clusters).get(cluster).cloned()
    }

    /// Number of cached cluster records.
    pub fn len(&self) -> usize {
        lock(&self.clusters).len()
    }

    /// True if no cluster is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the key → record map, taken under the cache lock and released.
    pub fn snapshot(&self) -> Vec<(String, Arc<ClusterRecord>)> {
        lock(&self.clusters)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Resolve `cluster` and replace the record's snapshot.
    ///
    /// Concurrent callers are not deduplicated; the last writer wins. On registry
    /// failure the previous snapshot is kept and `false` is returned.
    pub fn recompute(&self, cluster: &str, record: &ClusterRecord) -> bool {
        match self.resolver.resolve(cluster) {
            Ok(assignment) => {
                record.store(assignment);
                true
            }
            Err(e) => {
                tracing::warn!(cluster = %cluster, error = %e, "Endpoint resolution failed, keeping previous snapshot");
                metrics::record_resolve_error();
                false
            }
        }
    }

    /// Cached assignment for `cluster`, computing it on first access.
    pub fn assignment(&self, cluster: &str) -> Option<Arc<Assignment>> {
        let record = self.get_or_create(cluster);
        if let Some(assignment) = record.current_assignment() {
            return Some(assignment);
        }
        self.recompute(cluster, &record);
        record.current_assignment()
    }

    /// Register `conn` as the watcher for `node_id` on `cluster`.
    ///
    /// A different connection already registered under `node_id` is woken so it
    /// can notice it has been superseded, then replaced.
    pub fn register(&self, cluster: &str, node_id: &str, conn: &Arc<Connection>) {
        loop {
            let record = self.get_or_create(cluster);
            if record.add_watcher(cluster, node_id, conn) {
                return;
            }
            // Lost a race with eviction; retry on a fresh record.
        }
    }

    /// Remove `conn` from `cluster` if it is still the registered watcher for `node_id`.
    ///
    /// A stale handle to an already replaced connection is ignored. Removing the
    /// last watcher evicts the record from the cache. Returns true if removed.
    pub fn deregister(&self, cluster: &str, node_id: &str, conn: &Arc<Connection>) -> bool {
        let Some(record) = self.get(cluster) else {
            tracing::warn!(cluster = %cluster, node = %node_id, "Deregister for missing cluster");
            return false;
        };

        let now_empty = {
            let mut state = lock(&record.state);
            match state.watchers.get(node_id) {
                Some(current) if Arc::ptr_eq(current, conn) => {}
                Some(current) => {
                    tracing::debug!(
                        cluster = %cluster,
                        node = %node_id,
                        stale_peer = %conn.peer_addr(),
                        active_peer = %current.peer_addr(),
                        "Ignoring deregister from replaced connection"
                    );
                    return false;
                }
                None => return false,
            }
            state.watchers.remove(node_id);
            state.watchers.is_empty()
        };

        if now_empty {
            self.evict_if_unwatched(cluster, &record);
        }
        true
    }

    fn evict_if_unwatched(&self, cluster: &str, record: &Arc<ClusterRecord>) {
        let mut clusters = lock(&self.clusters);
        let Some(current) = clusters.get(cluster) else {
            return;
        };
        if !Arc::ptr_eq(current, record) {
            return;
        }
        {
            let mut state = lock(&record.state);
            // A watcher may have registered after the record lock was released.
            if !state.watchers.is_empty() {
                return;
            }
            state.evicted = true;
        }
        clusters.remove(cluster);
        metrics::set_cluster_count(clusters.len());
        tracing::info!(cluster = %cluster, remaining = clusters.len(), "Removed unused cluster");
    }

    /// Debug view of every cached cluster.
    pub fn dump(&self) -> BTreeMap<String, ClusterRecordInfo> {
        let clusters = lock(&self.clusters);
        clusters
            .iter()
            .map(|(name, record)| (name.clone(), record.info()))
            .collect()
    }
}
