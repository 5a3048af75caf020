//! Endpoint discovery core.
//!
//! # Data Flow
//! ```text
//! client connects
//!     → stream.rs (first request: node id, watched clusters)
//!     → cache.rs (register watcher, read or lazily compute assignment)
//!     → protocol.rs (DiscoveryResponse) → client
//!
//! registry change / operator push
//!     → push.rs (recompute every cluster, wake every watcher)
//!     → stream.rs (re-read cache, re-send)
//! ```
//!
//! # Design Decisions
//! - One process-wide cache object, constructed explicitly and passed by reference
//! - Each connection is an actor: one task owns its state, wake signals and
//!   requests arrive as messages
//! - Wake signals never block the sender; a pending signal already covers a newer one
//! - Recomputation is not deduplicated; the last snapshot written wins
//! - Client acknowledgements are logged, never reconciled

pub mod cache;
pub mod connection;
pub mod protocol;
pub mod push;
pub mod resolver;
pub mod server;
pub mod stream;

pub use cache::{ClusterCache, ClusterRecord, ClusterRecordInfo};
pub use connection::{Connection, ConnectionInfo, NodeIdGenerator};
pub use protocol::{Any, DiscoveryRequest, DiscoveryResponse, ErrorDetail, Node, ENDPOINT_TYPE};
pub use push::{push_all, PushSummary};
pub use resolver::{group_by_zone, EndpointResolver};
pub use server::EndpointDiscoveryServer;
pub use stream::{Inbound, StreamState};
