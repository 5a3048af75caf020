//! Endpoints, locality groups and cluster assignments.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::ModelError;

/// A single address:port destination backing a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "SocketAddress", try_from = "SocketAddress")]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    /// Build an endpoint, validating the address literal.
    pub fn new(address: &str, port: u16) -> Result<Self, ModelError> {
        let address: IpAddr = address
            .parse()
            .map_err(|_| ModelError::InvalidAddress(address.to_string()))?;
        Ok(Self { address, port })
    }

    /// True for IPv4 addresses, including IPv4-mapped IPv6.
    pub fn ipv4_compat(&self) -> bool {
        match self.address {
            IpAddr::V4(_) => true,
            IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some(),
        }
    }
}

/// Serialized form of an [`Endpoint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SocketAddress {
    address: String,
    port_value: u32,
    #[serde(default)]
    ipv4_compat: bool,
    #[serde(default = "default_protocol")]
    protocol: String,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

impl From<Endpoint> for SocketAddress {
    fn from(ep: Endpoint) -> Self {
        Self {
            address: ep.address.to_string(),
            port_value: u32::from(ep.port),
            ipv4_compat: ep.ipv4_compat(),
            protocol: default_protocol(),
        }
    }
}

impl TryFrom<SocketAddress> for Endpoint {
    type Error = ModelError;

    fn try_from(sa: SocketAddress) -> Result<Self, Self::Error> {
        let port = u16::try_from(sa.port_value)
            .map_err(|_| ModelError::InvalidAddress(format!("{}:{}", sa.address, sa.port_value)))?;
        Endpoint::new(&sa.address, port)
    }
}

/// Endpoints of a cluster that share one zone label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalityGroup {
    /// Availability zone; an empty zone is its own group.
    pub zone: String,
    pub endpoints: Vec<Endpoint>,
}

/// Immutable snapshot of a cluster's endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub cluster_name: String,
    pub endpoints: Vec<LocalityGroup>,
}

impl Assignment {
    pub fn new(cluster_name: impl Into<String>, endpoints: Vec<LocalityGroup>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            endpoints,
        }
    }

    /// True if no locality group was resolved.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Total endpoints across all locality groups.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.iter().map(|g| g.endpoints.len()).sum()
    }
}
