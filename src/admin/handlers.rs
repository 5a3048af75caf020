use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::eds::{EndpointDiscoveryServer, PushSummary};

/// Query parameters of `/debug/edsz`.
#[derive(Debug, Default, Deserialize)]
pub struct EdszParams {
    pub debug: Option<String>,
    pub push: Option<String>,
}

#[derive(Serialize)]
pub struct DebugToggle {
    pub debug: bool,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub clusters: usize,
    pub debug: bool,
}

/// Endpoint discovery status.
///
/// - `debug=0|1` toggles verbose protocol logging and only acknowledges the toggle
/// - `push=1` runs a global push before dumping
/// - otherwise dumps every cluster record with its watchers
pub async fn edsz(
    State(server): State<Arc<EndpointDiscoveryServer>>,
    Query(params): Query<EdszParams>,
) -> Response {
    if let Some(debug) = params.debug.filter(|d| !d.is_empty()) {
        server.set_debug(debug == "1");
        return Json(DebugToggle {
            debug: server.debug_enabled(),
        })
        .into_response();
    }

    if params.push.as_deref() == Some("1") {
        match server.push_all_blocking().await {
            Ok(PushSummary { clusters, woken, .. }) => {
                tracing::info!(clusters, woken, "Push triggered from debug endpoint");
            }
            Err(e) => {
                tracing::error!(error = %e, "Push task failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
        }
    }

    Json(server.debug_snapshot()).into_response()
}

pub async fn get_status(
    State(server): State<Arc<EndpointDiscoveryServer>>,
) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        clusters: server.cache().len(),
        debug: server.debug_enabled(),
    })
}
