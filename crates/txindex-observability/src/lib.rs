//! txindex-observability — logging initialisation and metric handles.
//!
//! Exporter wiring (OTLP, Prometheus, …) is deliberately external; this
//! crate only defines the instruments the pipeline records into.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::IndexerMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
