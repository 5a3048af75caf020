//! Discovery protocol messages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::DiscoveryError;
use crate::model::Assignment;

/// Type URL of every endpoint discovery resource.
pub const ENDPOINT_TYPE: &str = "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment";

/// Identity declared by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
}

/// Error reported by a client when it rejects a previous response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Client → server message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryRequest {
    pub node: Option<Node>,
    pub resource_names: Vec<String>,
    pub version_info: String,
    pub response_nonce: String,
    pub type_url: String,
    pub error_detail: Option<ErrorDetail>,
}

impl DiscoveryRequest {
    /// Initial subscription request for `clusters`.
    pub fn subscribe(node_id: impl Into<String>, clusters: &[&str]) -> Self {
        Self {
            node: Some(Node { id: node_id.into() }),
            resource_names: clusters.iter().map(|c| c.to_string()).collect(),
            type_url: ENDPOINT_TYPE.to_string(),
            ..Default::default()
        }
    }

    /// Acknowledgement of `response`, keeping the same resource names.
    pub fn ack(&self, response: &DiscoveryResponse) -> Self {
        Self {
            version_info: response.version_info.clone(),
            response_nonce: response.nonce.clone(),
            error_detail: None,
            ..self.clone()
        }
    }

    pub fn node_id(&self) -> &str {
        self.node.as_ref().map(|n| n.id.as_str()).unwrap_or_default()
    }
}

/// A typed, serialized resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Any {
    pub type_url: String,
    pub value: serde_json::Value,
}

impl Any {
    pub fn pack<T: Serialize>(type_url: &str, message: &T) -> Result<Self, DiscoveryError> {
        Ok(Self {
            type_url: type_url.to_string(),
            value: serde_json::to_value(message)?,
        })
    }

    pub fn unpack<T: DeserializeOwned>(&self) -> Result<T, DiscoveryError> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// Server → client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub type_url: String,
    pub version_info: String,
    pub nonce: String,
    pub resources: Vec<Any>,
}

impl DiscoveryResponse {
    /// Build a response carrying `assignments`, with a fresh version and nonce.
    ///
    /// Versions are not reconciled with client acknowledgements; the server
    /// always sends its current state.
    pub fn endpoints<'a>(
        assignments: impl IntoIterator<Item = &'a Assignment>,
    ) -> Result<Self, DiscoveryError> {
        let resources = assignments
            .into_iter()
            .map(|a| Any::pack(ENDPOINT_TYPE, a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            type_url: ENDPOINT_TYPE.to_string(),
            version_info: version_info(),
            nonce: uuid::Uuid::new_v4().to_string(),
            resources,
        })
    }

    /// Decode every resource as an [`Assignment`].
    pub fn assignments(&self) -> Result<Vec<Assignment>, DiscoveryError> {
        self.resources.iter().map(Any::unpack).collect()
    }
}

fn version_info() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:09}", now.as_secs(), now.subsec_nanos())
}
