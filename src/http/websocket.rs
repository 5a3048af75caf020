//! WebSocket transport for the endpoint discovery stream.
//!
//! # Data Flow
//! ```text
//! client frames ──► decode_frame ──► Inbound stream ──► EndpointDiscoveryServer
//!                                                            │
//! client ◄── JSON text frames ◄── writer task ◄── outbound ◄─┘
//! ```
//!
//! Each request and response is one JSON text frame. A close frame from the client
//! is a clean end of stream; a frame that does not decode ends the stream with an
//! error.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::eds::{DiscoveryRequest, DiscoveryResponse, Inbound};
use crate::error::StreamError;
use crate::http::server::AppState;

pub async fn stream_endpoints(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, peer, socket))
}

async fn serve_socket(state: AppState, peer: SocketAddr, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let inbound = Box::pin(stream.filter_map(|frame| async move { decode_frame(frame) }));

    let (out_tx, out_rx) = mpsc::channel(state.outbound_buffer);
    let writer = tokio::spawn(write_responses(sink, out_rx));

    tracing::debug!(peer = %peer, "Discovery stream accepted");
    if let Err(e) = state
        .server
        .stream_endpoints(peer.to_string(), inbound, out_tx)
        .await
    {
        tracing::debug!(peer = %peer, error = %e, "Discovery stream ended with error");
    }

    // The handler dropped its sender; the writer drains and sends a close frame.
    if let Err(e) = writer.await {
        tracing::warn!(peer = %peer, error = %e, "Response writer task failed");
    }
}

/// Translate one WebSocket frame. Control frames other than close are skipped.
fn decode_frame(frame: Result<Message, axum::Error>) -> Option<Inbound> {
    match frame {
        Ok(Message::Text(text)) => Some(decode(text.as_str().as_bytes())),
        Ok(Message::Binary(bytes)) => Some(decode(&bytes)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Ok(Message::Close(_)) => Some(Err(StreamError::Cancelled)),
        Err(e) => Some(Err(StreamError::Transport(e.to_string()))),
    }
}

fn decode(bytes: &[u8]) -> Inbound {
    serde_json::from_slice::<DiscoveryRequest>(bytes).map_err(|e| StreamError::Decode(e.to_string()))
}

async fn write_responses(
    mut sink: SplitSink<WebSocket, Message>,
    mut responses: mpsc::Receiver<DiscoveryResponse>,
) {
    while let Some(response) = responses.recv().await {
        let text = match serde_json::to_string(&response) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode discovery response");
                break;
            }
        };
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            tracing::debug!(error = %e, "Client went away while sending response");
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frames() {
        let req = decode_frame(Ok(Message::Text(
            r#"{"node":{"id":"sidecar"},"resource_names":["a|http"]}"#.into(),
        )))
        .unwrap()
        .unwrap();
        assert_eq!(req.node_id(), "sidecar");
        assert_eq!(req.resource_names, vec!["a|http".to_string()]);

        assert!(decode_frame(Ok(Message::Ping(Default::default()))).is_none());
        assert_eq!(
            decode_frame(Ok(Message::Close(None))).unwrap().unwrap_err(),
            StreamError::Cancelled
        );
        assert!(matches!(
            decode_frame(Ok(Message::Text("{not json".into()))),
            Some(Err(StreamError::Decode(_)))
        ));
    }
}
