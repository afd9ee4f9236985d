//! End-to-end scenarios for the ingestion state machine and the drivers,
//! run against a scripted chain and the in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use txindex_core::types::{BlockHeader, RawTxRecord};
use txindex_core::{validate, IndexError, TxStore};
use txindex_engine::{run_backfill, run_rollback, IngestConfig, IngestLoop, IngestState};
use txindex_rpc::{ChainClient, TransportError};
use txindex_storage::MemStore;

// ─── Scripted chain ──────────────────────────────────────────────────────────

#[derive(Default)]
struct MockChain {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, (BlockHeader, Vec<RawTxRecord>)>>,
}

impl MockChain {
    fn new() -> Self {
        Self::default()
    }

    fn set_head(&self, number: u64) {
        self.head.store(number, Ordering::SeqCst);
    }

    /// Install (or reorg away) the block at `header.number`.
    fn put_block(&self, header: BlockHeader, txs: Vec<RawTxRecord>) {
        self.blocks
            .lock()
            .unwrap()
            .insert(header.number, (header, txs));
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_head(&self) -> Result<u64, TransportError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        Ok(1)
    }

    async fn fetch_block_header(
        &self,
        number: u64,
    ) -> Result<Option<BlockHeader>, TransportError> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&number)
            .map(|(h, _)| h.clone()))
    }

    async fn fetch_block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<(BlockHeader, Vec<RawTxRecord>)>, TransportError> {
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn block_hash(tag: u64) -> String {
    format!("0x{tag:064x}")
}

fn tx_hash(tag: u64) -> String {
    format!("0x{:064x}", 0xdead_0000_0000 + tag)
}

fn address(tag: u64) -> String {
    format!("0x{tag:040x}")
}

fn header(number: u64, hash: &str, parent: &str) -> BlockHeader {
    BlockHeader {
        number,
        hash: hash.to_string(),
        parent_hash: parent.to_string(),
        timestamp: (number * 12) as i64,
    }
}

fn raw_tx(block_number: u64, hash: &str, seed: u64) -> RawTxRecord {
    RawTxRecord {
        block_number: Some(block_number),
        block_hash: Some(hash.to_string()),
        transaction_hash: Some(tx_hash(block_number * 100 + seed)),
        transaction_index: Some(seed as u32),
        from_address: Some(address(seed + 1)),
        to_address: Some(address(seed + 2)),
        amount: Some("1000000000000000000".to_string()),
        is_internal_call: None,
    }
}

/// Seed the store with committed blocks so reorg scenarios start from a
/// known lineage.
async fn seed_store(store: &MemStore, blocks: &[(u64, &str)]) {
    for (number, hash) in blocks {
        let record = validate(&raw_tx(*number, hash, 0)).expect("fixture must validate");
        store.append_batch(&[record]).await.unwrap();
    }
}

fn ingest_loop(
    chain: &Arc<MockChain>,
    store: &Arc<MemStore>,
) -> IngestLoop<Arc<MockChain>, Arc<MemStore>> {
    IngestLoop::new(Arc::clone(chain), Arc::clone(store), IngestConfig::default())
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn straight_line_ingest() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemStore::new());
    let h100 = block_hash(1100);
    let h101 = block_hash(1101);

    chain.set_head(100);
    chain.put_block(
        header(100, &h100, &block_hash(1099)),
        vec![raw_tx(100, &h100, 0), raw_tx(100, &h100, 1)],
    );

    let mut ingest = ingest_loop(&chain, &store);

    // Cold start: one commit at the chain head.
    assert_eq!(ingest.step().await.unwrap(), IngestState::Bootstrapping);
    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!((cp.block_number, cp.block_hash.as_str()), (100, h100.as_str()));

    // Nothing new yet.
    assert_eq!(ingest.step().await.unwrap(), IngestState::AtHead);

    // Head advances; lineage matches; block commits.
    chain.put_block(header(101, &h101, &h100), vec![raw_tx(101, &h101, 0)]);
    chain.set_head(101);
    assert_eq!(ingest.step().await.unwrap(), IngestState::Syncing);

    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!((cp.block_number, cp.block_hash.as_str()), (101, h101.as_str()));
    assert_eq!(store.row_count(), 3);
}

#[tokio::test]
async fn empty_block_still_advances_checkpoint() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemStore::new());
    let h100 = block_hash(1100);
    let h101 = block_hash(1101);

    chain.set_head(100);
    chain.put_block(header(100, &h100, &block_hash(1099)), vec![raw_tx(100, &h100, 0)]);

    let mut ingest = ingest_loop(&chain, &store);
    ingest.step().await.unwrap();

    chain.put_block(header(101, &h101, &h100), vec![]);
    chain.set_head(101);
    assert_eq!(ingest.step().await.unwrap(), IngestState::Syncing);

    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!(cp.block_number, 101, "progress is monotonic across empty blocks");
    assert_eq!(store.row_count(), 1, "no rows for the empty block");
}

#[tokio::test]
async fn one_block_reorg_walks_back_and_recovers() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemStore::new());
    let h99 = block_hash(1099);
    let hash_a = block_hash(0xaaaa);
    let hash_a2 = block_hash(0xaaa2);
    let h101 = block_hash(1101);

    // DB believes: 99 ← 100 (hashA).
    seed_store(&store, &[(99, &h99), (100, &hash_a)]).await;

    // Chain replaced 100 with 100' and built 101 on top of it.
    chain.set_head(101);
    chain.put_block(header(100, &hash_a2, &h99), vec![raw_tx(100, &hash_a2, 7)]);
    chain.put_block(header(101, &h101, &hash_a2), vec![raw_tx(101, &h101, 0)]);

    let mut ingest = ingest_loop(&chain, &store);

    // Block 101's parent is hashA2, not hashA → rollback-to(100).
    assert_eq!(ingest.step().await.unwrap(), IngestState::Reorganizing);
    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!((cp.block_number, cp.block_hash.as_str()), (99, h99.as_str()));
    assert!(store.rows_at_block(100).is_empty(), "orphaned rows deleted");

    // Next iteration re-tests lineage at 100': parent h99 matches; commits.
    assert_eq!(ingest.step().await.unwrap(), IngestState::Syncing);
    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!((cp.block_number, cp.block_hash.as_str()), (100, hash_a2.as_str()));

    // And 101 follows.
    assert_eq!(ingest.step().await.unwrap(), IngestState::Syncing);
    assert_eq!(
        store.load_checkpoint().await.unwrap().unwrap().block_number,
        101
    );
}

#[tokio::test]
async fn two_block_reorg_walks_back_twice() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemStore::new());
    let h98 = block_hash(1098);
    let h99 = block_hash(1099);
    let hash_a = block_hash(0xaaaa);
    let h99b = block_hash(0x99b);
    let h100b = block_hash(0x100b);
    let h101b = block_hash(0x101b);

    // DB believes: 98 ← 99 ← 100 (hashA).
    seed_store(&store, &[(98, &h98), (99, &h99), (100, &hash_a)]).await;

    // Chain reshuffled from 99 up: 99' ← 100'' ← 101''.
    chain.set_head(101);
    chain.put_block(header(99, &h99b, &h98), vec![raw_tx(99, &h99b, 3)]);
    chain.put_block(header(100, &h100b, &h99b), vec![raw_tx(100, &h100b, 4)]);
    chain.put_block(header(101, &h101b, &h100b), vec![raw_tx(101, &h101b, 5)]);

    let mut ingest = ingest_loop(&chain, &store);

    // 101'' does not extend hashA → rollback to 100; checkpoint (99, h99).
    assert_eq!(ingest.step().await.unwrap(), IngestState::Reorganizing);
    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!((cp.block_number, cp.block_hash.as_str()), (99, h99.as_str()));

    // 100'' extends h99b, not h99 → rollback to 99; checkpoint (98, h98).
    assert_eq!(ingest.step().await.unwrap(), IngestState::Reorganizing);
    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!((cp.block_number, cp.block_hash.as_str()), (98, h98.as_str()));

    // Lineage now matches; the loop resumes forward.
    assert_eq!(ingest.step().await.unwrap(), IngestState::Syncing);
    assert_eq!(ingest.step().await.unwrap(), IngestState::Syncing);
    assert_eq!(ingest.step().await.unwrap(), IngestState::Syncing);
    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!((cp.block_number, cp.block_hash.as_str()), (101, h101b.as_str()));
}

#[tokio::test]
async fn backfill_is_idempotent() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemStore::new());

    for number in 50..=60 {
        let hash = block_hash(1000 + number);
        let parent = block_hash(1000 + number - 1);
        chain.put_block(
            header(number, &hash, &parent),
            vec![raw_tx(number, &hash, 0), raw_tx(number, &hash, 1)],
        );
    }

    let first = run_backfill(&*chain, &*store, 50, 60, 4).await.unwrap();
    assert_eq!(first.blocks, 11);
    assert_eq!(first.records, 22);
    let rows_after_first = store.row_count();

    let second = run_backfill(&*chain, &*store, 50, 60, 4).await.unwrap();
    assert_eq!(second.records, 0, "replay inserts nothing");
    assert_eq!(store.row_count(), rows_after_first);

    let cp = store.load_checkpoint().await.unwrap().unwrap();
    assert_eq!(cp.block_number, 60);
}

#[tokio::test]
async fn backfill_aborts_on_missing_block() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemStore::new());

    // Block 51 is absent.
    for number in [50u64, 52] {
        let hash = block_hash(1000 + number);
        chain.put_block(header(number, &hash, &block_hash(999)), vec![raw_tx(number, &hash, 0)]);
    }

    let err = run_backfill(&*chain, &*store, 50, 52, 10).await.unwrap_err();
    assert!(matches!(err, IndexError::Rpc(_)));
}

#[tokio::test]
async fn invalid_records_divert_without_aborting_the_block() {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemStore::new());
    let h100 = block_hash(1100);

    let mut bad = raw_tx(100, &h100, 1);
    bad.amount = Some("-1".to_string());

    chain.set_head(100);
    chain.put_block(
        header(100, &h100, &block_hash(1099)),
        vec![raw_tx(100, &h100, 0), bad],
    );

    let mut ingest = ingest_loop(&chain, &store);
    assert_eq!(ingest.step().await.unwrap(), IngestState::Bootstrapping);

    assert_eq!(store.row_count(), 1, "good record persisted, bad one diverted");
    assert_eq!(
        store.load_checkpoint().await.unwrap().unwrap().block_number,
        100
    );
}

#[tokio::test]
async fn rollback_command_precondition_leaves_store_untouched() {
    let store = Arc::new(MemStore::new());
    seed_store(&store, &[(499, &block_hash(499)), (500, &block_hash(500))]).await;

    let err = run_rollback(&*store, 600).await.unwrap_err();
    assert!(matches!(err, IndexError::Precondition(_)));
    assert_eq!(store.row_count(), 2);
    assert_eq!(
        store.load_checkpoint().await.unwrap().unwrap().block_number,
        500
    );
}
