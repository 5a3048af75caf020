//! In-memory registry and subset store.

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::model::{Labels, LabelsCollection};
use crate::registry::{port_matches, ConfigStore, ServiceDiscovery, ServiceInstance};

/// Thread-safe service registry keyed by hostname.
#[derive(Debug, Default)]
pub struct MemoryServiceDiscovery {
    services: DashMap<String, Vec<ServiceInstance>>,
    failure: ArcSwapOption<RegistryError>,
}

impl MemoryServiceDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding `instances`.
    pub fn from_instances(instances: impl IntoIterator<Item = ServiceInstance>) -> Self {
        let registry = Self::new();
        for instance in instances {
            registry.add_instance(instance);
        }
        registry
    }

    pub fn add_instance(&self, instance: ServiceInstance) {
        self.services
            .entry(instance.hostname.clone())
            .or_default()
            .push(instance);
    }

    /// Remove every instance of `hostname`. Returns how many were removed.
    pub fn remove_service(&self, hostname: &str) -> usize {
        self.services
            .remove(hostname)
            .map(|(_, instances)| instances.len())
            .unwrap_or(0)
    }

    /// Replace the whole registry content.
    pub fn replace_all(&self, instances: impl IntoIterator<Item = ServiceInstance>) {
        let mut grouped: HashMap<String, Vec<ServiceInstance>> = HashMap::new();
        for instance in instances {
            grouped
                .entry(instance.hostname.clone())
                .or_default()
                .push(instance);
        }
        self.services.retain(|hostname, _| grouped.contains_key(hostname));
        for (hostname, instances) in grouped {
            self.services.insert(hostname, instances);
        }
    }

    /// Make every lookup fail with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<RegistryError>) {
        self.failure.store(error.map(Arc::new));
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl ServiceDiscovery for MemoryServiceDiscovery {
    fn instances(
        &self,
        hostname: &str,
        port_names: &[String],
        labels: &LabelsCollection,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        if let Some(err) = self.failure.load_full() {
            return Err((*err).clone());
        }

        let Some(entry) = self.services.get(hostname) else {
            return Ok(Vec::new());
        };
        Ok(entry
            .value()
            .iter()
            .filter(|i| port_matches(i, port_names) && labels.matches(&i.labels))
            .cloned()
            .collect())
    }
}

/// Subset definitions, swapped atomically on reload.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    /// (hostname, subset) → labels
    subsets: ArcSwap<HashMap<(String, String), Labels>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_subsets(subsets: impl IntoIterator<Item = (String, String, Labels)>) -> Self {
        let store = Self::new();
        store.replace_all(subsets);
        store
    }

    /// Add or overwrite one subset definition.
    pub fn set_subset(&self, hostname: &str, subset: &str, labels: Labels) {
        self.subsets.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert((hostname.to_string(), subset.to_string()), labels.clone());
            next
        });
    }

    /// Replace every subset definition with `(hostname, subset, labels)` triples.
    pub fn replace_all(&self, subsets: impl IntoIterator<Item = (String, String, Labels)>) {
        let next = subsets
            .into_iter()
            .map(|(host, name, labels)| ((host, name), labels))
            .collect();
        self.subsets.store(Arc::new(next));
    }
}

impl ConfigStore for MemoryConfigStore {
    fn subset_to_labels(&self, subset: &str, hostname: &str) -> LabelsCollection {
        if subset.is_empty() {
            return LabelsCollection::default();
        }
        self.subsets
            .load()
            .get(&(hostname.to_string(), subset.to_string()))
            .cloned()
            .map(LabelsCollection::from)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(host: &str, addr: &str, port_name: &str, version: &str) -> ServiceInstance {
        ServiceInstance {
            hostname: host.into(),
            address: addr.into(),
            port: 80,
            port_name: port_name.into(),
            zone: String::new(),
            labels: Labels::parse(&format!("version={version}")),
        }
    }

    #[test]
    fn test_instances_filtering() {
        let registry = MemoryServiceDiscovery::from_instances([
            instance("hello", "10.0.0.1", "http", "v1"),
            instance("hello", "10.0.0.2", "http", "v2"),
            instance("hello", "10.0.0.3", "grpc", "v1"),
            instance("world", "10.0.0.4", "http", "v1"),
        ]);

        let all_http = registry
            .instances("hello", &["http".into()], &LabelsCollection::default())
            .unwrap();
        assert_eq!(all_http.len(), 2);

        let v1 = LabelsCollection::from(Labels::parse("version=v1"));
        let v1_http = registry.instances("hello", &["http".into()], &v1).unwrap();
        assert_eq!(v1_http.len(), 1);
        assert_eq!(v1_http[0].address, "10.0.0.1");

        let missing = registry
            .instances("nobody", &["http".into()], &LabelsCollection::default())
            .unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_replace_and_remove() {
        let registry = MemoryServiceDiscovery::from_instances([
            instance("hello", "10.0.0.1", "http", "v1"),
            instance("world", "10.0.0.2", "http", "v1"),
        ]);
        assert_eq!(registry.service_count(), 2);

        registry.replace_all([instance("hello", "10.0.0.9", "http", "v1")]);
        assert_eq!(registry.service_count(), 1);
        let hello = registry
            .instances("hello", &[], &LabelsCollection::default())
            .unwrap();
        assert_eq!(hello[0].address, "10.0.0.9");

        assert_eq!(registry.remove_service("hello"), 1);
        assert_eq!(registry.remove_service("hello"), 0);
    }

    #[test]
    fn test_forced_failure() {
        let registry = MemoryServiceDiscovery::new();
        registry.set_failure(Some(RegistryError::Unavailable("down".into())));
        assert!(registry
            .instances("hello", &[], &LabelsCollection::default())
            .is_err());
        registry.set_failure(None);
        assert!(registry
            .instances("hello", &[], &LabelsCollection::default())
            .is_ok());
    }

    #[test]
    fn test_subset_lookup() {
        let store = MemoryConfigStore::new();
        store.set_subset("hello", "v1", Labels::parse("version=v1"));

        let labels = store.subset_to_labels("v1", "hello");
        assert!(labels.matches(&Labels::parse("version=v1,app=hello")));
        assert!(!labels.matches(&Labels::parse("version=v2")));

        assert!(store.subset_to_labels("v2", "hello").is_empty());
        assert!(store.subset_to_labels("", "hello").is_empty());
    }
}
