//! Global push coordination.

use serde::Serialize;
use std::time::Instant;

use crate::eds::cache::ClusterCache;
use crate::observability::metrics;

/// Outcome of one [`push_all`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    pub clusters: usize,
    /// Clusters whose resolution failed and kept their previous snapshot.
    pub failed: usize,
    /// Wake signals delivered (coalesced signals are not counted).
    pub woken: usize,
}

/// Recompute every cached cluster and wake each registered watcher.
///
/// The cache map is copied under the cache lock, which is released before any
/// resolution work. Watchers of a cluster whose resolution failed are still woken
/// and receive the previous snapshot.
pub fn push_all(cache: &ClusterCache) -> PushSummary {
    let start = Instant::now();
    let snapshot = cache.snapshot();
    let mut summary = PushSummary {
        clusters: snapshot.len(),
        ..Default::default()
    };

    for (cluster, record) in &snapshot {
        if !cache.recompute(cluster, record) {
            summary.failed += 1;
        }
        summary.woken += record.wake_all();
    }

    let elapsed = start.elapsed();
    metrics::record_push_all(elapsed);
    tracing::info!(
        clusters = summary.clusters,
        failed = summary.failed,
        woken = summary.woken,
        elapsed_ms = elapsed.as_millis() as u64,
        "Push all complete"
    );
    summary
}
