//! Endpoint discovery server.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                 ENDPOINT DISCOVERY                   │
//!                       │                                                      │
//!   proxy stream        │  ┌───────────┐   ┌───────────┐   ┌──────────────┐    │
//!   ────────────────────┼─▶│   http    │──▶│  stream   │──▶│ cluster cache│    │
//!   ◀───────────────────┼──│ websocket │◀──│  handler  │◀──│  + registry  │    │
//!                       │  └───────────┘   └─────▲─────┘   └──────┬───────┘    │
//!                       │                        │ wake           │ resolve    │
//!                       │                  ┌─────┴─────┐   ┌──────▼───────┐    │
//!   /debug/edsz ────────┼─────────────────▶│ push all  │   │   resolver   │    │
//!   config reload ──────┼─────────────────▶│           │   │  + registry  │    │
//!                       │                  └───────────┘   └──────────────┘    │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use endpoint_discovery::config::{apply_config, apply_reloads, load_config, ConfigWatcher};
use endpoint_discovery::eds::EndpointResolver;
use endpoint_discovery::lifecycle::wait_for_signal;
use endpoint_discovery::observability::{logging, metrics};
use endpoint_discovery::registry::{MemoryConfigStore, MemoryServiceDiscovery};
use endpoint_discovery::{AdminServer, EndpointDiscoveryServer, HttpServer, ServerConfig, Shutdown};

#[derive(Parser)]
#[command(name = "endpoint-discovery")]
#[command(about = "Endpoint discovery control plane", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "endpoint-discovery starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = Arc::new(MemoryServiceDiscovery::new());
    let subsets = Arc::new(MemoryConfigStore::new());
    let instances = apply_config(&config, &services, &subsets);
    tracing::info!(
        services = config.services.len(),
        instances,
        subsets = config.subsets.len(),
        "Registry loaded"
    );

    let resolver = EndpointResolver::new(services.clone(), subsets.clone());
    let server = Arc::new(EndpointDiscoveryServer::new(resolver, config.discovery.debug));
    let shutdown = Shutdown::new();

    // Keep the watcher handle alive for the life of the process.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            tokio::spawn(apply_reloads(
                updates,
                services.clone(),
                subsets.clone(),
                server.clone(),
                shutdown.subscribe(),
            ));
            Some(handle)
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let discovery = tokio::spawn(
        HttpServer::new(&config.listener, server.clone()).run(listener, shutdown.subscribe()),
    );

    let admin = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        Some(tokio::spawn(
            AdminServer::new(server.clone()).run(listener, shutdown.subscribe()),
        ))
    } else {
        None
    };

    tokio::spawn(wait_for_signal(shutdown.clone()));

    discovery.await??;
    if let Some(admin) = admin {
        admin.await??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
