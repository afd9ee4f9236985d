//! The ingestion loop — a re-org-detecting state machine.
//!
//! Each iteration reads the checkpoint and the chain head, then takes one
//! of four paths:
//!
//! - no checkpoint            → `Bootstrapping`: commit the block at head
//! - next block beyond head   → `AtHead`: sleep one polling period
//! - parent hash matches      → `Syncing`: validate and commit one block
//! - parent hash differs      → `Reorganizing`: roll back one block
//!
//! The reorg branch rolls back exactly one block per iteration; the loop
//! itself is the reorg-depth search, re-testing lineage against a lower
//! checkpoint until a common ancestor is found. Every rollback is atomic
//! and idempotent, so the walk is safe to interrupt at any point.

use std::time::{Duration, Instant};

use tokio::sync::watch;

use txindex_core::types::{BlockHeader, RawTxRecord};
use txindex_core::{validate_batch, IndexError, TxStore};
use txindex_observability::IndexerMetrics;
use txindex_rpc::ChainClient;

/// Runtime state of the ingestion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// No checkpoint yet — committing the first block at chain head.
    Bootstrapping,
    /// Behind the chain head and committing forward.
    Syncing,
    /// Caught up; waiting one polling period.
    AtHead,
    /// Parent hash mismatch — walking back to a common ancestor.
    Reorganizing,
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::Syncing => write!(f, "syncing"),
            Self::AtHead => write!(f, "at-head"),
            Self::Reorganizing => write!(f, "reorganizing"),
        }
    }
}

/// Timing knobs for the loop.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Sleep between iterations while at head.
    pub poll_interval: Duration,
    /// Sleep after a failed iteration.
    pub error_backoff: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// The ingestion state machine.
pub struct IngestLoop<C, S> {
    client: C,
    store: S,
    config: IngestConfig,
    metrics: IndexerMetrics,
    state: IngestState,
}

impl<C: ChainClient, S: TxStore> IngestLoop<C, S> {
    pub fn new(client: C, store: S, config: IngestConfig) -> Self {
        Self {
            client,
            store,
            config,
            metrics: IndexerMetrics::from_global(),
            state: IngestState::Bootstrapping,
        }
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Run until the shutdown signal flips. Non-fatal errors are logged and
    /// followed by a fixed backoff; a fatal error (failed rollback) halts
    /// the loop and propagates.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexError> {
        tracing::info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "ingestion loop started"
        );
        while !*shutdown.borrow() {
            match self.step().await {
                Ok(IngestState::AtHead) => {
                    if sleep_or_shutdown(self.config.poll_interval, &mut shutdown).await {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!(
                        error = %e,
                        "fatal error — halting ingestion; manual intervention required"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        backoff_secs = self.config.error_backoff.as_secs(),
                        "iteration failed — backing off"
                    );
                    if sleep_or_shutdown(self.config.error_backoff, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
        tracing::info!("ingestion loop stopped");
        Ok(())
    }

    /// One iteration of the state machine. Exposed for tests, which drive
    /// the loop step by step against a scripted chain.
    pub async fn step(&mut self) -> Result<IngestState, IndexError> {
        let chain_head = self.client.current_head().await?;
        let checkpoint = self.store.load_checkpoint().await?;

        let Some(cp) = checkpoint else {
            return self.bootstrap(chain_head).await;
        };

        let target = cp.block_number + 1;
        if target > chain_head {
            self.state = IngestState::AtHead;
            return Ok(self.state);
        }

        let Some(header) = self.client.fetch_block_header(target).await? else {
            // Advertised but not served yet; poll again.
            self.state = IngestState::AtHead;
            return Ok(self.state);
        };

        if !header.is_child_of(&cp.block_hash) {
            self.state = IngestState::Reorganizing;
            self.metrics.record_reorg();
            tracing::warn!(
                block = target,
                expected_parent = %cp.block_hash,
                actual_parent = %header.parent_hash,
                "parent hash mismatch — chain reorganization detected"
            );
            let deleted = self.store.rollback_to(cp.block_number).await?;
            tracing::warn!(
                rolled_back_to = cp.block_number.saturating_sub(1),
                rows_deleted = deleted,
                "rolled back one block; re-testing lineage"
            );
            return Ok(self.state);
        }

        let started = Instant::now();
        let Some((_, raw)) = self.client.fetch_block_with_transactions(target).await? else {
            return Err(IndexError::Rpc(format!(
                "block {target} vanished between header and body fetch"
            )));
        };
        self.persist_block(&header, &raw, started).await?;
        self.state = IngestState::Syncing;
        Ok(self.state)
    }

    /// Cold start: no checkpoint, so indexing begins at the current head.
    async fn bootstrap(&mut self, chain_head: u64) -> Result<IngestState, IndexError> {
        self.state = IngestState::Bootstrapping;
        tracing::info!(chain_head, "no checkpoint found — bootstrapping at chain head");

        let Some((header, raw)) = self
            .client
            .fetch_block_with_transactions(chain_head)
            .await?
        else {
            return Ok(self.state);
        };
        let started = Instant::now();
        self.persist_block(&header, &raw, started).await?;
        Ok(self.state)
    }

    /// Validate and commit one block. Empty blocks advance the checkpoint
    /// explicitly so progress stays monotonic.
    async fn persist_block(
        &mut self,
        header: &BlockHeader,
        raw: &[RawTxRecord],
        started: Instant,
    ) -> Result<(), IndexError> {
        let (records, report) = validate_batch(raw, header.number);
        if !report.is_empty() {
            self.metrics.record_validation_failures(report.len() as u64);
            for entry in report.entries() {
                tracing::warn!(
                    block = entry.block_number,
                    reason = %entry.reason,
                    "record failed validation — diverted"
                );
            }
        }

        if records.is_empty() {
            self.store
                .advance_checkpoint(header.number, &header.hash)
                .await?;
        } else {
            self.store.append_batch(&records).await?;
        }

        self.metrics
            .record_block(header.number, started.elapsed().as_secs_f64());
        tracing::info!(
            block = header.number,
            transactions = records.len(),
            diverted = report.len(),
            "block committed"
        );
        Ok(())
    }
}

/// Returns `true` when the sleep was cut short by shutdown.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.changed() => *shutdown.borrow(),
    }
}
