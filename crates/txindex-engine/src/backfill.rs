//! Historical backfill — parallel range fetch, batched idempotent commit.
//!
//! Fetches every block of a range concurrently (each fetch carries the
//! transport's own retry budget), validates, and commits the whole range
//! through the bulk-load path. Ranges commit in ascending order; a block
//! that stays unavailable after retries aborts the run, and the operator
//! simply re-runs — idempotent inserts guarantee no duplication.

use futures::future;

use txindex_core::{validate_batch, FailureReport, IndexError, TxStore};
use txindex_rpc::ChainClient;

/// Outcome of a completed backfill run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillStats {
    /// Blocks fetched and processed.
    pub blocks: u64,
    /// Rows actually inserted (replays conflict away).
    pub records: u64,
    /// Records diverted to the validation failure report.
    pub invalid: u64,
}

/// Fetch and commit blocks `[start, end]` in ranges of `batch_blocks`.
pub async fn run_backfill<C: ChainClient, S: TxStore>(
    client: &C,
    store: &S,
    start: u64,
    end: u64,
    batch_blocks: u64,
) -> Result<BackfillStats, IndexError> {
    if start > end {
        return Err(IndexError::Precondition(format!(
            "start block {start} is after end block {end}"
        )));
    }
    let batch_blocks = batch_blocks.max(1);
    tracing::info!(start, end, batch_blocks, "backfill started");

    let mut stats = BackfillStats::default();
    let mut cur = start;
    loop {
        let batch_end = cur.saturating_add(batch_blocks - 1).min(end);

        let fetches = (cur..=batch_end).map(|n| client.fetch_block_with_transactions(n));
        let fetched = future::try_join_all(fetches).await?;

        let mut batch_records = Vec::new();
        let mut report = FailureReport::default();
        for (offset, block) in fetched.into_iter().enumerate() {
            let number = cur + offset as u64;
            let Some((_, raw)) = block else {
                return Err(IndexError::Rpc(format!(
                    "block {number} not available — aborting; re-run to resume"
                )));
            };
            let (mut records, block_report) = validate_batch(&raw, number);
            batch_records.append(&mut records);
            report.extend(block_report);
        }

        for entry in report.entries() {
            tracing::warn!(
                block = entry.block_number,
                reason = %entry.reason,
                "record failed validation — diverted"
            );
        }

        let inserted = if batch_records.is_empty() {
            0
        } else {
            store.bulk_ingest(&batch_records).await?
        };

        stats.blocks += batch_end - cur + 1;
        stats.records += inserted;
        stats.invalid += report.len() as u64;
        tracing::info!(from = cur, to = batch_end, inserted, "range committed");

        if batch_end == end {
            break;
        }
        cur = batch_end + 1;
    }

    tracing::info!(
        blocks = stats.blocks,
        records = stats.records,
        invalid = stats.invalid,
        "backfill finished"
    );
    Ok(stats)
}
