//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the discovery server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::Labels;
use crate::registry::ServiceInstance;

/// Root configuration for the discovery server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Discovery stream listener.
    pub listener: ListenerConfig,

    /// Debug/operational endpoint.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Discovery protocol behaviour.
    pub discovery: DiscoveryConfig,

    /// Statically registered services.
    pub services: Vec<ServiceConfig>,

    /// Subset name → label selector rules.
    pub subsets: Vec<SubsetConfig>,
}

impl ServerConfig {
    /// Flatten `services` into registry instances.
    pub fn service_instances(&self) -> Vec<ServiceInstance> {
        self.services
            .iter()
            .flat_map(|svc| {
                svc.instances.iter().map(move |inst| ServiceInstance {
                    hostname: svc.hostname.clone(),
                    address: inst.address.clone(),
                    port: inst.port,
                    port_name: inst.port_name.clone(),
                    zone: inst.zone.clone(),
                    labels: Labels::from(inst.labels.clone()),
                })
            })
            .collect()
    }

    /// `(hostname, subset, labels)` triples for the subset store.
    pub fn subset_rules(&self) -> Vec<(String, String, Labels)> {
        self.subsets
            .iter()
            .map(|s| (s.hostname.clone(), s.name.clone(), Labels::from(s.labels.clone())))
            .collect()
    }
}

/// Listener configuration for discovery streams.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:15010").
    pub bind_address: String,

    /// Responses buffered per stream before the handler waits on the client.
    pub outbound_buffer: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:15010".to_string(),
            outbound_buffer: 16,
        }
    }
}

/// Debug endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve `/debug/edsz`.
    pub enabled: bool,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:9093".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Discovery protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Initial state of verbose per-request/response logging.
    pub debug: bool,

    /// Run a global push after a config reload changed the registry.
    pub push_on_reload: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            debug: false,
            push_on_reload: true,
        }
    }
}

/// A service and its instances.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Fully qualified hostname (e.g., "hello.default.svc.cluster.local").
    pub hostname: String,

    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

/// One service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceConfig {
    /// IP address; invalid addresses are skipped at resolution time.
    pub address: String,

    pub port: u16,

    /// Service port name (e.g., "http").
    #[serde(default)]
    pub port_name: String,

    /// Availability zone.
    #[serde(default)]
    pub zone: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Subset definition for a host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubsetConfig {
    pub hostname: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}
