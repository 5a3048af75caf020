//! Endpoint discovery control plane.
//!
//! Serves cluster load assignments (endpoints grouped by zone) to proxies over a
//! long-lived discovery stream, and pushes fresh assignments whenever the
//! service registry changes.

pub mod admin;
pub mod config;
pub mod eds;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod registry;

pub use config::schema::ServerConfig;
pub use eds::EndpointDiscoveryServer;
pub use error::{DiscoveryError, Result};
pub use http::{AdminServer, HttpServer};
pub use lifecycle::Shutdown;
