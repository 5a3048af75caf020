//! Domain model for endpoint discovery.
//!
//! # Data Flow
//! ```text
//! cluster key (string)
//!     → cluster_key.rs (subset or legacy grammar)
//!     → registry lookup (hostname, port names, labels)
//!     → endpoint.rs (validated Endpoint, grouped into LocalityGroup)
//!     → Assignment (immutable snapshot per cluster)
//! ```
//!
//! # Design Decisions
//! - Assignments are replaced wholesale, never mutated in place
//! - An instance with an unparseable address is skipped, never fatal
//! - Unknown or malformed cluster keys resolve to nothing rather than failing

pub mod cluster_key;
pub mod endpoint;
pub mod labels;

pub use cluster_key::{ClusterKey, ClusterQuery, Direction};
pub use endpoint::{Assignment, Endpoint, LocalityGroup};
pub use labels::{Labels, LabelsCollection};
