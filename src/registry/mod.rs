//! Service registry collaborators.
//!
//! # Data Flow
//! ```text
//! Endpoint Resolver
//!     → ConfigStore::subset_to_labels (subset name → label sets)
//!     → ServiceDiscovery::instances (hostname + ports + labels → instances)
//! ```
//!
//! # Design Decisions
//! - Both collaborators are traits so the discovery core never depends on a
//!   concrete platform registry
//! - The bundled in-memory implementations are fed from the config file and
//!   replaced wholesale on reload

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::model::{Labels, LabelsCollection};

pub use memory::{MemoryConfigStore, MemoryServiceDiscovery};

/// A concrete instance backing a service port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub hostname: String,
    /// Instance address; validated only when turned into an endpoint.
    pub address: String,
    pub port: u16,
    /// Name of the service port this instance serves.
    pub port_name: String,
    /// Availability zone; empty when unknown.
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub labels: Labels,
}

/// Resolves a logical service into its live instances.
pub trait ServiceDiscovery: Send + Sync {
    /// Instances of `hostname` serving any of `port_names` whose labels match `labels`.
    ///
    /// An empty port name matches every port; a numeric port name also matches
    /// the instance port number.
    fn instances(
        &self,
        hostname: &str,
        port_names: &[String],
        labels: &LabelsCollection,
    ) -> Result<Vec<ServiceInstance>, RegistryError>;
}

/// Maps subset names to label selectors.
pub trait ConfigStore: Send + Sync {
    /// Label sets for `subset` of `hostname`. Unknown subsets select everything.
    fn subset_to_labels(&self, subset: &str, hostname: &str) -> LabelsCollection;
}

/// True if `instance` serves one of the requested port names.
pub(crate) fn port_matches(instance: &ServiceInstance, port_names: &[String]) -> bool {
    if port_names.is_empty() {
        return true;
    }
    port_names.iter().any(|name| {
        name.is_empty()
            || *name == instance.port_name
            || name.parse::<u16>().is_ok_and(|n| n == instance.port)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(port: u16, port_name: &str) -> ServiceInstance {
        ServiceInstance {
            hostname: "hello".into(),
            address: "10.0.0.1".into(),
            port,
            port_name: port_name.into(),
            zone: String::new(),
            labels: Labels::new(),
        }
    }

    #[test]
    fn test_port_matching() {
        let http = instance(8080, "http");
        assert!(port_matches(&http, &[]));
        assert!(port_matches(&http, &[String::new()]));
        assert!(port_matches(&http, &["http".into()]));
        assert!(port_matches(&http, &["8080".into()]));
        assert!(!port_matches(&http, &["grpc".into()]));
        assert!(!port_matches(&http, &["9090".into()]));
    }
}
