//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, routes)
//!     → websocket.rs (upgrade, frame decode, response writer)
//!     → EndpointDiscoveryServer::stream_endpoints
//! ```

pub mod server;
pub mod websocket;

pub use server::{
    AdminServer, AppState, HttpServer, FETCH_ENDPOINTS_PATH, STREAM_ENDPOINTS_PATH,
    STREAM_LOAD_STATS_PATH,
};
