//! txindex-engine — the state machines that drive the indexer.
//!
//! # Architecture
//!
//! ```text
//! IngestLoop (daemon)      Backfill / Rollback (maintenance)
//!      │                            │
//!      ├── ChainClient  ←───────────┤        (txindex-rpc)
//!      ├── validate_batch ←─────────┤        (txindex-core)
//!      └── TxStore       ←──────────┘        (txindex-storage)
//! ```
//!
//! Both paths share the same rollback primitive and the same validation
//! gate; the loop owns reorg detection, the drivers own range throughput.

pub mod backfill;
pub mod ingest;
pub mod rollback;

pub use backfill::{run_backfill, BackfillStats};
pub use ingest::{IngestConfig, IngestLoop, IngestState};
pub use rollback::run_rollback;
