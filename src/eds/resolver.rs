//! Endpoint resolution.
//!
//! # Responsibilities
//! - Turn a cluster key into a registry query
//! - Fetch matching instances from the service registry
//! - Validate instance addresses and group endpoints by zone

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::model::{Assignment, ClusterKey, ClusterQuery, Endpoint, LocalityGroup};
use crate::observability::metrics;
use crate::registry::{ConfigStore, ServiceDiscovery, ServiceInstance};

/// Resolves cluster keys into endpoint assignments.
#[derive(Clone)]
pub struct EndpointResolver {
    discovery: Arc<dyn ServiceDiscovery>,
    config_store: Arc<dyn ConfigStore>,
}

impl EndpointResolver {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            discovery,
            config_store,
        }
    }

    /// Registry query for `cluster_name`, or `None` if the key is malformed.
    pub fn query(&self, cluster_name: &str) -> Option<ClusterQuery> {
        match ClusterKey::parse(cluster_name)? {
            ClusterKey::Subset {
                port_name,
                subset,
                hostname,
                ..
            } => {
                let labels = self.config_store.subset_to_labels(&subset, &hostname);
                Some(ClusterQuery {
                    hostname,
                    port_names: vec![port_name],
                    labels,
                })
            }
            ClusterKey::Service {
                hostname,
                port_names,
                labels,
            } => Some(ClusterQuery {
                hostname,
                port_names,
                labels,
            }),
        }
    }

    /// Compute a fresh assignment for `cluster_name`.
    ///
    /// Malformed keys produce an empty assignment. Registry failures are returned
    /// so the caller can keep its previous snapshot.
    pub fn resolve(&self, cluster_name: &str) -> Result<Assignment, RegistryError> {
        let Some(query) = self.query(cluster_name) else {
            tracing::debug!(cluster = %cluster_name, "Unrecognized cluster key, no instances");
            return Ok(Assignment::new(cluster_name, Vec::new()));
        };

        let instances =
            self.discovery
                .instances(&query.hostname, &query.port_names, &query.labels)?;

        if instances.is_empty() {
            tracing::debug!(
                cluster = %cluster_name,
                host = %query.hostname,
                ports = ?query.port_names,
                labels = ?query.labels,
                "No instances"
            );
        }

        Ok(Assignment::new(cluster_name, group_by_zone(&instances)))
    }
}

/// Group instances into one locality group per distinct zone, in first-seen order.
///
/// Instances with an unparseable address are skipped.
pub fn group_by_zone(instances: &[ServiceInstance]) -> Vec<LocalityGroup> {
    let mut groups: Vec<LocalityGroup> = Vec::new();
    let mut by_zone: HashMap<&str, usize> = HashMap::new();

    for instance in instances {
        let endpoint = match Endpoint::new(&instance.address, instance.port) {
            Ok(ep) => ep,
            Err(e) => {
                tracing::warn!(
                    host = %instance.hostname,
                    error = %e,
                    "Skipping instance with invalid endpoint"
                );
                metrics::record_invalid_endpoint();
                continue;
            }
        };

        let idx = *by_zone.entry(instance.zone.as_str()).or_insert_with(|| {
            groups.push(LocalityGroup {
                zone: instance.zone.clone(),
                endpoints: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].endpoints.push(endpoint);
    }

    groups
}
