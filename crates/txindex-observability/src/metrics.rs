//! Indexer metrics definitions.
//!
//! All metrics use OpenTelemetry conventions; without an installed meter
//! provider they are no-ops, so the engine records unconditionally.

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
};

/// Central metrics handle for the indexing pipeline.
#[derive(Clone)]
pub struct IndexerMetrics {
    pub reorgs_detected: Counter<u64>,
    pub blocks_indexed: Counter<u64>,
    pub validation_failures: Counter<u64>,
    pub latest_indexed_block: Gauge<u64>,
    pub indexing_latency_seconds: Histogram<f64>,
}

impl IndexerMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            reorgs_detected: meter
                .u64_counter("txindex.reorgs_detected_total")
                .with_description("Chain reorganizations detected by the lineage check")
                .build(),
            blocks_indexed: meter
                .u64_counter("txindex.blocks_indexed_total")
                .with_description("Blocks committed, empty blocks included")
                .build(),
            validation_failures: meter
                .u64_counter("txindex.validation_failures_total")
                .with_description("Records diverted to the validation failure report")
                .build(),
            latest_indexed_block: meter
                .u64_gauge("txindex.latest_indexed_block_number")
                .with_description("Block number of the last committed head")
                .build(),
            indexing_latency_seconds: meter
                .f64_histogram("txindex.indexing_latency_seconds")
                .with_description("Fetch-validate-commit time for one block")
                .build(),
        }
    }

    /// Handle bound to the global meter provider.
    pub fn from_global() -> Self {
        Self::new(&global::meter("txindex"))
    }

    pub fn record_block(&self, block_number: u64, latency_secs: f64) {
        self.blocks_indexed.add(1, &[]);
        self.latest_indexed_block.record(block_number, &[]);
        self.indexing_latency_seconds.record(latency_secs, &[]);
    }

    pub fn record_reorg(&self) {
        self.reorgs_detected.add(1, &[]);
    }

    pub fn record_validation_failures(&self, count: u64) {
        if count > 0 {
            self.validation_failures.add(count, &[]);
        }
    }
}
