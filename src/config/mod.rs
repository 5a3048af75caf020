//! Configuration management subsystem.
//!
//! ```text
//! TOML file
//!     → loader.rs      read and deserialize into ServerConfig
//!     → validation.rs  collect every semantic error
//!     → schema.rs      flatten services/subsets into registry entries
//!
//! file changed
//!     → watcher.rs     reload, validate, replace registry, push to all watchers
//! ```
//!
//! Listener addresses are read once at startup; a reload only touches the registry.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, DiscoveryConfig, InstanceConfig, ListenerConfig, ObservabilityConfig,
    ServerConfig, ServiceConfig, SubsetConfig,
};
pub use watcher::{apply_config, apply_reloads, ConfigWatcher};
