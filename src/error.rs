//! Error types for the endpoint discovery server.
//!
//! Errors are contained where they occur: a bad instance address only drops that
//! instance, a registry failure only aborts one recomputation, and a transport
//! failure only ends one connection.

use thiserror::Error;

/// Failures while building model values from registry data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The instance address is not a valid IPv4 or IPv6 literal.
    #[error("invalid IP address {0}")]
    InvalidAddress(String),
}

/// Failures reported by a service registry collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("registry lookup for {hostname} failed: {message}")]
    Lookup { hostname: String, message: String },
}

/// Failures on a single discovery stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The peer or the server cancelled the stream.
    #[error("stream cancelled")]
    Cancelled,

    /// The peer sent a frame that could not be decoded.
    #[error("malformed message: {0}")]
    Decode(String),

    /// Any other receive or send failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl StreamError {
    /// Clean-close codes end a stream without reporting a failure.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

/// Main error type returned by the discovery service methods.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The response could not be delivered to the client.
    #[error("send failure, closing stream: {0}")]
    Send(String),

    #[error("not implemented")]
    NotImplemented,

    #[error("unsupported streaming method")]
    Unsupported,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

impl axum::response::IntoResponse for DiscoveryError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            DiscoveryError::NotImplemented | DiscoveryError::Unsupported => {
                StatusCode::NOT_IMPLEMENTED
            }
            DiscoveryError::Stream(StreamError::Decode(_)) => StatusCode::BAD_REQUEST,
            DiscoveryError::Stream(_) | DiscoveryError::Send(_) => StatusCode::BAD_GATEWAY,
            DiscoveryError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
