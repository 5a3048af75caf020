//! Logs and metrics.
//!
//! ```text
//! stream handler / cache / push sweep
//!     → logging.rs  (tracing events: node, cluster, peer fields)
//!     → metrics.rs  (gauges and counters behind the `metrics` facade)
//! ```
//!
//! Per-request protocol logs (REQ, ACK, PUSH) are emitted only while the
//! runtime debug flag is on.

pub mod logging;
pub mod metrics;
