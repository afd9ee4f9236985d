//! txindex-core — foundation for the fault-tolerant EVM transaction indexer.
//!
//! # Architecture
//!
//! ```text
//! Transport (txindex-rpc) → IngestLoop / Backfill (txindex-engine)
//!                                ├── validate()      (schema gate)
//!                                ├── TxStore         (append / bulk / rollback)
//!                                └── Checkpoint      (durable resume cursor)
//! ```

pub mod config;
pub mod error;
pub mod store;
pub mod types;
pub mod validate;

pub use config::Config;
pub use error::IndexError;
pub use store::{Checkpoint, TxStore, CHECKPOINT_ID};
pub use types::{BlockHeader, RawTxRecord, TxRecord};
pub use validate::{validate, validate_batch, FailureEntry, FailureReport};
