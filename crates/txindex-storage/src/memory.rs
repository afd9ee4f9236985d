//! In-memory storage backend.
//!
//! Mirrors the Postgres contract in RAM — same idempotence key, same
//! checkpoint semantics, same rollback hash recovery — so the engine's
//! state machine can be exercised without a database.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use txindex_core::{Checkpoint, IndexError, TxRecord, TxStore};

/// In-memory transaction store. All data is lost when the process exits.
#[derive(Default)]
pub struct MemStore {
    rows: Mutex<BTreeMap<(u64, String), TxRecord>>,
    checkpoint: Mutex<Option<Checkpoint>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted rows.
    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Rows at exactly `block_number`.
    pub fn rows_at_block(&self, block_number: u64) -> Vec<TxRecord> {
        self.rows
            .lock()
            .unwrap()
            .range((block_number, String::new())..(block_number + 1, String::new()))
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Highest persisted block, if any rows exist.
    pub fn max_block(&self) -> Option<u64> {
        self.rows.lock().unwrap().keys().next_back().map(|(b, _)| *b)
    }

    fn insert_all(&self, records: &[TxRecord]) -> u64 {
        let mut rows = self.rows.lock().unwrap();
        let mut inserted = 0;
        for record in records {
            let key = (record.block_number, record.transaction_hash.clone());
            if !rows.contains_key(&key) {
                rows.insert(key, record.clone());
                inserted += 1;
            }
        }
        inserted
    }

    fn bump_checkpoint(&self, block_number: u64, block_hash: &str) {
        let mut cp = self.checkpoint.lock().unwrap();
        let now = chrono::Utc::now().timestamp();
        match cp.as_mut() {
            Some(existing) if existing.block_number > block_number => {
                existing.updated_at = now;
            }
            _ => {
                *cp = Some(Checkpoint {
                    block_number,
                    block_hash: block_hash.to_string(),
                    updated_at: now,
                });
            }
        }
    }
}

#[async_trait]
impl TxStore for MemStore {
    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, IndexError> {
        Ok(self.checkpoint.lock().unwrap().clone())
    }

    async fn append_batch(&self, records: &[TxRecord]) -> Result<u64, IndexError> {
        let inserted = self.insert_all(records);
        if let Some(head) = records.iter().max_by_key(|r| r.block_number) {
            self.bump_checkpoint(head.block_number, &head.block_hash);
        }
        Ok(inserted)
    }

    async fn bulk_ingest(&self, records: &[TxRecord]) -> Result<u64, IndexError> {
        self.append_batch(records).await
    }

    async fn rollback_to(&self, n: u64) -> Result<u64, IndexError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(block, _), _| *block < n);
        let deleted = (before - rows.len()) as u64;

        let mut cp = self.checkpoint.lock().unwrap();
        if n == 0 {
            *cp = None;
        } else {
            let existing = cp
                .take()
                .ok_or_else(|| IndexError::RollbackFailed("no checkpoint row to rewind".into()))?;
            let recovered_hash = rows
                .range((n - 1, String::new())..(n, String::new()))
                .next()
                .map(|(_, r)| r.block_hash.clone())
                .unwrap_or(existing.block_hash);
            *cp = Some(Checkpoint {
                block_number: n - 1,
                block_hash: recovered_hash,
                updated_at: chrono::Utc::now().timestamp(),
            });
        }
        Ok(deleted)
    }

    async fn advance_checkpoint(
        &self,
        block_number: u64,
        block_hash: &str,
    ) -> Result<(), IndexError> {
        self.bump_checkpoint(block_number, block_hash);
        Ok(())
    }
}
