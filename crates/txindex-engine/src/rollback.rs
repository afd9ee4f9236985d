//! The operator-facing rollback command.
//!
//! A thin precondition gate around the shared rollback primitive: the
//! target must not be ahead of the current checkpoint (roll-forward is
//! meaningless), and there must be a checkpoint to rewind at all.

use txindex_core::{Checkpoint, IndexError, TxStore};

/// Revert the store to `target`: afterwards no row has
/// `block_number >= target` and the checkpoint sits at `target - 1`
/// (`None` when rolled back to genesis).
pub async fn run_rollback<S: TxStore>(
    store: &S,
    target: u64,
) -> Result<Option<Checkpoint>, IndexError> {
    let checkpoint = store.load_checkpoint().await?.ok_or_else(|| {
        IndexError::Precondition("no checkpoint exists — nothing to roll back".into())
    })?;

    if target > checkpoint.block_number {
        return Err(IndexError::Precondition(format!(
            "target {target} is ahead of the current checkpoint {} — roll-forward is not supported",
            checkpoint.block_number
        )));
    }

    let deleted = store.rollback_to(target).await?;
    tracing::info!(target, rows_deleted = deleted, "rollback complete");
    store.load_checkpoint().await
}
