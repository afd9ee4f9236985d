//! txindex-rpc — the reliable RPC transport.
//!
//! Wraps an ordered list of JSON-RPC endpoints behind one client. A
//! background monitor probes every endpoint on a fixed cadence and marks
//! anything unreachable or lagging the fleet maximum as unhealthy; every
//! foreground call routes to the first healthy endpoint in configured
//! priority order, re-reading the health set between retry attempts so
//! recovery propagates. When nothing is healthy the first configured
//! endpoint is used anyway — the process is never locked out.

pub mod client;
pub mod error;
pub mod health;
pub mod request;
pub mod retry;
pub mod transport;
pub mod types;

pub use client::ChainClient;
pub use error::TransportError;
pub use health::{EndpointHealth, HealthMonitor};
pub use retry::{RetryConfig, RetryPolicy};
pub use transport::{Transport, TransportConfig};
