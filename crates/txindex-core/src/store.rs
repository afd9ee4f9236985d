//! Persistence contracts — the checkpoint cursor and the `TxStore` trait.
//!
//! The checkpoint is the sole source of truth for resume position. It is
//! created lazily on first commit and updated transactionally with every
//! commit or rollback, so after any successful operation every persisted
//! row's block number is covered by `checkpoint.block_number`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::types::TxRecord;

/// The constant row id of the single checkpoint row.
pub const CHECKPOINT_ID: &str = "chain_head";

/// The durable cursor marking the last committed head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last committed block number.
    pub block_number: u64,
    /// Hash of that block as known at commit time.
    pub block_hash: String,
    /// Unix timestamp of the last checkpoint write.
    pub updated_at: i64,
}

/// Transactional persistence contract shared by the daemon and the
/// maintenance utility.
///
/// Every method runs in a single transactional unit: one connection is
/// checked out, one transaction committed or rolled back, and the
/// connection released on all exit paths.
///
/// Implementations: `PostgresStore` (production) and `MemStore` (tests),
/// both in `txindex-storage`.
#[async_trait]
pub trait TxStore: Send + Sync {
    /// Load the checkpoint, or `None` before the first commit.
    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, IndexError>;

    /// Insert a small real-time batch idempotently and advance the
    /// checkpoint to the batch head in the same transaction.
    ///
    /// Returns the number of rows actually inserted (replayed rows conflict
    /// away silently).
    async fn append_batch(&self, records: &[TxRecord]) -> Result<u64, IndexError>;

    /// Insert a large backfill batch through the fastest bulk path the
    /// backend offers, reconciled for idempotence, checkpoint included.
    async fn bulk_ingest(&self, records: &[TxRecord]) -> Result<u64, IndexError>;

    /// Atomically delete every row with `block_number >= n` and rewind the
    /// checkpoint to `n - 1` (rolling back to 0 deletes the checkpoint row,
    /// returning the store to cold-start state).
    ///
    /// The rewound checkpoint's hash is recovered from surviving rows at
    /// block `n - 1` when that block left any; otherwise the previous hash
    /// stays in place and the ingestion loop self-heals by walking back one
    /// more block on its next lineage check.
    ///
    /// Any failure here is fatal to the caller: a partially rolled-back
    /// store must not be driven forward.
    async fn rollback_to(&self, n: u64) -> Result<u64, IndexError>;

    /// Record progress across an empty block: no rows, checkpoint only.
    async fn advance_checkpoint(&self, block_number: u64, block_hash: &str)
        -> Result<(), IndexError>;
}

#[async_trait]
impl<T: TxStore + ?Sized> TxStore for std::sync::Arc<T> {
    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, IndexError> {
        (**self).load_checkpoint().await
    }

    async fn append_batch(&self, records: &[TxRecord]) -> Result<u64, IndexError> {
        (**self).append_batch(records).await
    }

    async fn bulk_ingest(&self, records: &[TxRecord]) -> Result<u64, IndexError> {
        (**self).bulk_ingest(records).await
    }

    async fn rollback_to(&self, n: u64) -> Result<u64, IndexError> {
        (**self).rollback_to(n).await
    }

    async fn advance_checkpoint(
        &self,
        block_number: u64,
        block_hash: &str,
    ) -> Result<(), IndexError> {
        (**self).advance_checkpoint(block_number, block_hash).await
    }
}
