//! txindex-storage — persistence backends for the transaction indexer.
//!
//! Backends:
//! - [`postgres`] — PostgreSQL via `sqlx` (production)
//! - [`memory`] — in-memory (engine tests, ephemeral runs)
//!
//! Both implement the [`txindex_core::TxStore`] contract: one transaction
//! per call, idempotent inserts on `(transaction_hash, block_number)`, and
//! the checkpoint updated inside the same transaction as the rows.

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::{PostgresOptions, PostgresStore};
