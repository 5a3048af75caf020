//! Configuration file watcher for hot reload.
//!
//! A changed file is reloaded and validated on the notify thread; valid configs
//! are handed to [`apply_reloads`], which swaps the registry contents and runs a
//! global push so every watcher sees the new endpoints.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::ServerConfig;
use crate::eds::EndpointDiscoveryServer;
use crate::registry::{MemoryConfigStore, MemoryServiceDiscovery};

/// Watches the configuration file and emits validated configs.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ServerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let reload_path = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&reload_path) {
                        Ok(config) => {
                            tracing::info!(path = ?reload_path, "Config file changed, reloading");
                            let _ = update_tx.send(config);
                        }
                        Err(e) => tracing::error!(
                            path = ?reload_path,
                            error = %e,
                            "Failed to reload config, keeping current registry"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

/// Replace registry contents from `config`. Returns the instance count.
pub fn apply_config(
    config: &ServerConfig,
    services: &MemoryServiceDiscovery,
    subsets: &MemoryConfigStore,
) -> usize {
    let instances = config.service_instances();
    let count = instances.len();
    services.replace_all(instances);
    subsets.replace_all(config.subset_rules());
    count
}

/// Apply reloaded configs until the channel closes or shutdown is signalled.
pub async fn apply_reloads(
    mut updates: mpsc::UnboundedReceiver<ServerConfig>,
    services: Arc<MemoryServiceDiscovery>,
    subsets: Arc<MemoryConfigStore>,
    server: Arc<EndpointDiscoveryServer>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                let instances = apply_config(&config, &services, &subsets);
                tracing::info!(instances, subsets = config.subsets.len(), "Registry reloaded");
                if config.discovery.push_on_reload {
                    if let Err(e) = server.push_all_blocking().await {
                        tracing::error!(error = %e, "Push after reload failed");
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config reload loop stopped");
}
