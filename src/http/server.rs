//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the discovery router (stream, fetch, load stats)
//! - Build the admin router on its own listener
//! - Serve both until the shared shutdown signal fires

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::config::ListenerConfig;
use crate::eds::{DiscoveryRequest, EndpointDiscoveryServer, Inbound};
use crate::http::websocket;

pub const STREAM_ENDPOINTS_PATH: &str = "/envoy.api.v2.EndpointDiscoveryService/StreamEndpoints";
pub const FETCH_ENDPOINTS_PATH: &str = "/envoy.api.v2.EndpointDiscoveryService/FetchEndpoints";
pub const STREAM_LOAD_STATS_PATH: &str =
    "/envoy.service.load_stats.v2.LoadReportingService/StreamLoadStats";

/// Application state injected into discovery handlers.
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<EndpointDiscoveryServer>,
    pub outbound_buffer: usize,
}

/// HTTP server for the discovery service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ListenerConfig, server: Arc<EndpointDiscoveryServer>) -> Self {
        let state = AppState {
            server,
            outbound_buffer: config.outbound_buffer.max(1),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route(STREAM_ENDPOINTS_PATH, get(websocket::stream_endpoints))
            .route(FETCH_ENDPOINTS_PATH, post(fetch_endpoints))
            .route(STREAM_LOAD_STATS_PATH, get(stream_load_stats))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        serve(listener, self.router, "Discovery", shutdown).await
    }
}

/// HTTP server for the debug endpoints.
pub struct AdminServer {
    router: Router,
}

impl AdminServer {
    pub fn new(server: Arc<EndpointDiscoveryServer>) -> Self {
        Self {
            router: setup_admin_router(server),
        }
    }

    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        serve(listener, self.router, "Admin", shutdown).await
    }
}

async fn serve(
    listener: TcpListener,
    router: Router,
    name: &'static str,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "{} server starting", name);

    let app = router.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("{} server stopped", name);
    Ok(())
}

async fn fetch_endpoints(
    State(state): State<AppState>,
    Json(request): Json<DiscoveryRequest>,
) -> Response {
    match state.server.fetch_endpoints(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn stream_load_stats(State(state): State<AppState>) -> Response {
    match state
        .server
        .stream_load_stats(stream::empty::<Inbound>())
        .await
    {
        Ok(()) => ().into_response(),
        Err(e) => e.into_response(),
    }
}
