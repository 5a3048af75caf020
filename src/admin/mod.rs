//! Debug and operational endpoints.
//!
//! No authentication at this layer; bind the admin listener to a private address.

pub mod handlers;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use self::handlers::*;
use crate::eds::EndpointDiscoveryServer;

pub const EDSZ_PATH: &str = "/debug/edsz";
pub const STATUS_PATH: &str = "/debug/status";

pub fn setup_admin_router(server: Arc<EndpointDiscoveryServer>) -> Router {
    Router::new()
        .route(EDSZ_PATH, get(edsz))
        .route(STATUS_PATH, get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}
