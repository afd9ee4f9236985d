//! PostgreSQL storage backend.
//!
//! Every `TxStore` operation checks out one pooled connection, runs one
//! transaction, and releases the connection on all exit paths. Inserts are
//! conditional on the `(transaction_hash, block_number)` primary key so
//! replays conflict away silently; the checkpoint row advances inside the
//! same transaction, never past a rollback and never backwards past rows
//! already committed.
//!
//! `bulk_ingest` goes through a transaction-scoped staging table and the
//! wire-protocol COPY path: COPY is the fastest load primitive Postgres has
//! but cannot resolve conflicts per row, so the staging table takes the
//! stream and an `INSERT … SELECT … ON CONFLICT DO NOTHING` reconciles it.

use std::fmt::Write as _;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Row};

use async_trait::async_trait;
use txindex_core::{Checkpoint, IndexError, TxRecord, TxStore, CHECKPOINT_ID};

/// Connection options for the Postgres backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Pool acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
        }
    }
}

/// PostgreSQL-backed transaction store.
///
/// Thread-safe and cheaply cloneable — wraps a connection pool internally.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

const INSERT_COLUMNS: &str = "block_number, block_hash, transaction_hash, transaction_index, \
     from_address, to_address, amount, is_internal_call";

impl PostgresStore {
    /// Connect with default pool options.
    pub async fn connect(database_url: &str) -> Result<Self, IndexError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    /// Connect with custom pool options.
    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, IndexError> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(opts.acquire_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| IndexError::Storage(format!("postgres connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if they don't already exist.
    ///
    /// The transactions table is range-partitioned on `block_number`; a
    /// DEFAULT partition catches everything until the operator attaches
    /// explicit ranges. The BRIN index keeps the rollback delete path
    /// (`DELETE WHERE block_number >= N`) a range scan.
    pub async fn init_schema(&self) -> Result<(), IndexError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS checkpoint (
                id           TEXT PRIMARY KEY,
                block_number BIGINT NOT NULL,
                block_hash   TEXT NOT NULL,
                last_updated TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            "CREATE TABLE IF NOT EXISTS transactions (
                block_number      BIGINT  NOT NULL,
                block_hash        TEXT    NOT NULL,
                transaction_hash  TEXT    NOT NULL,
                transaction_index INTEGER NOT NULL,
                from_address      TEXT    NOT NULL,
                to_address        TEXT,
                amount            NUMERIC(78, 0) NOT NULL,
                is_internal_call  BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (transaction_hash, block_number)
            ) PARTITION BY RANGE (block_number)",
            "CREATE TABLE IF NOT EXISTS transactions_default
                PARTITION OF transactions DEFAULT",
            "CREATE INDEX IF NOT EXISTS idx_transactions_block_range
                ON transactions USING BRIN (block_number)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_from
                ON transactions (from_address)",
            "CREATE INDEX IF NOT EXISTS idx_transactions_to
                ON transactions (to_address)",
        ];
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        tracing::debug!("postgres schema initialized");
        Ok(())
    }

    /// Underlying pool, for custom queries and shutdown draining.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Drain the pool on graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TxStore for PostgresStore {
    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, IndexError> {
        let row = sqlx::query(
            "SELECT block_number, block_hash,
                    EXTRACT(EPOCH FROM last_updated)::BIGINT AS updated_at
             FROM checkpoint WHERE id = $1",
        )
        .bind(CHECKPOINT_ID)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| Checkpoint {
            block_number: r.get::<i64, _>("block_number") as u64,
            block_hash: r.get::<String, _>("block_hash"),
            updated_at: r.get::<i64, _>("updated_at"),
        }))
    }

    async fn append_batch(&self, records: &[TxRecord]) -> Result<u64, IndexError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let mut inserted = 0u64;
        for record in records {
            let result = sqlx::query(
                "INSERT INTO transactions (block_number, block_hash, transaction_hash, \
                     transaction_index, from_address, to_address, amount, is_internal_call)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (transaction_hash, block_number) DO NOTHING",
            )
            .bind(record.block_number as i64)
            .bind(&record.block_hash)
            .bind(&record.transaction_hash)
            .bind(record.transaction_index as i32)
            .bind(&record.from_address)
            .bind(&record.to_address)
            .bind(&record.amount)
            .bind(record.is_internal_call)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
            inserted += result.rows_affected();
        }

        if let Some((max_block, max_hash)) = batch_head(records) {
            upsert_checkpoint(&mut tx, max_block, &max_hash).await?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(inserted)
    }

    async fn bulk_ingest(&self, records: &[TxRecord]) -> Result<u64, IndexError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(
            "CREATE TEMP TABLE transactions_staging
                 (LIKE transactions INCLUDING DEFAULTS)
             ON COMMIT DROP",
        )
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        let payload = copy_payload(records);
        let mut copy = tx
            .copy_in_raw(&format!(
                "COPY transactions_staging ({INSERT_COLUMNS}) FROM STDIN"
            ))
            .await
            .map_err(storage_err)?;
        copy.send(payload.as_bytes()).await.map_err(storage_err)?;
        copy.finish().await.map_err(storage_err)?;

        let result = sqlx::query(&format!(
            "INSERT INTO transactions ({INSERT_COLUMNS})
             SELECT {INSERT_COLUMNS} FROM transactions_staging
             ON CONFLICT (transaction_hash, block_number) DO NOTHING"
        ))
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if let Some((max_block, max_hash)) = batch_head(records) {
            upsert_checkpoint(&mut tx, max_block, &max_hash).await?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn rollback_to(&self, n: u64) -> Result<u64, IndexError> {
        let mut tx = self.pool.begin().await.map_err(rollback_err)?;

        let deleted = sqlx::query("DELETE FROM transactions WHERE block_number >= $1")
            .bind(n as i64)
            .execute(&mut *tx)
            .await
            .map_err(rollback_err)?
            .rows_affected();

        if n == 0 {
            // Back to cold start: nothing below genesis to point at.
            sqlx::query("DELETE FROM checkpoint WHERE id = $1")
                .bind(CHECKPOINT_ID)
                .execute(&mut *tx)
                .await
                .map_err(rollback_err)?;
        } else {
            // Recover the rewound head's hash from surviving rows when block
            // n-1 left any; otherwise the old hash stays and the ingestion
            // loop walks back once more on its next lineage check.
            let updated = sqlx::query(
                "UPDATE checkpoint SET
                     block_number = $2,
                     block_hash = COALESCE(
                         (SELECT block_hash FROM transactions
                          WHERE block_number = $2 LIMIT 1),
                         block_hash),
                     last_updated = now()
                 WHERE id = $1",
            )
            .bind(CHECKPOINT_ID)
            .bind((n - 1) as i64)
            .execute(&mut *tx)
            .await
            .map_err(rollback_err)?;

            if updated.rows_affected() == 0 {
                return Err(IndexError::RollbackFailed(
                    "no checkpoint row to rewind".into(),
                ));
            }
        }

        tx.commit().await.map_err(rollback_err)?;
        Ok(deleted)
    }

    async fn advance_checkpoint(
        &self,
        block_number: u64,
        block_hash: &str,
    ) -> Result<(), IndexError> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;
        upsert_checkpoint(&mut conn, block_number, block_hash).await
    }
}

/// `(max block, its hash)` across a batch; `None` for an empty batch.
fn batch_head(records: &[TxRecord]) -> Option<(u64, String)> {
    records
        .iter()
        .max_by_key(|r| r.block_number)
        .map(|r| (r.block_number, r.block_hash.clone()))
}

/// Upsert the single checkpoint row, never moving it backwards — committing
/// a historical range must not rewind the cursor past rows already covered.
async fn upsert_checkpoint(
    conn: &mut PgConnection,
    block_number: u64,
    block_hash: &str,
) -> Result<(), IndexError> {
    sqlx::query(
        "INSERT INTO checkpoint (id, block_number, block_hash, last_updated)
         VALUES ($1, $2, $3, now())
         ON CONFLICT (id) DO UPDATE SET
             block_number = GREATEST(checkpoint.block_number, EXCLUDED.block_number),
             block_hash = CASE
                 WHEN EXCLUDED.block_number >= checkpoint.block_number
                     THEN EXCLUDED.block_hash
                 ELSE checkpoint.block_hash
             END,
             last_updated = EXCLUDED.last_updated",
    )
    .bind(CHECKPOINT_ID)
    .bind(block_number as i64)
    .bind(block_hash)
    .execute(conn)
    .await
    .map_err(storage_err)?;
    Ok(())
}

/// Text-format COPY payload: tab-separated, `\N` for an absent to_address.
fn copy_payload(records: &[TxRecord]) -> String {
    let mut buf = String::with_capacity(records.len() * 256);
    for r in records {
        let _ = writeln!(
            buf,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.block_number,
            r.block_hash,
            r.transaction_hash,
            r.transaction_index,
            r.from_address,
            r.to_address.as_deref().unwrap_or("\\N"),
            r.amount,
            if r.is_internal_call { "t" } else { "f" },
        );
    }
    buf
}

fn storage_err(e: sqlx::Error) -> IndexError {
    IndexError::Storage(e.to_string())
}

fn rollback_err(e: sqlx::Error) -> IndexError {
    IndexError::RollbackFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn record(block: u64, tx_hash: &str) -> TxRecord {
        TxRecord {
            block_number: block,
            block_hash: format!("0xblock{block}"),
            transaction_hash: tx_hash.to_string(),
            transaction_index: 0,
            from_address: format!("0x{}", "1".repeat(40)),
            to_address: None,
            amount: BigDecimal::from_str("1000000000000000000").unwrap(),
            is_internal_call: false,
        }
    }

    #[test]
    fn copy_payload_escapes_absent_to_address() {
        let payload = copy_payload(&[record(7, "0xt1")]);
        let fields: Vec<&str> = payload.trim_end().split('\t').collect();
        assert_eq!(fields[0], "7");
        assert_eq!(fields[5], "\\N");
        assert_eq!(fields[6], "1000000000000000000");
        assert_eq!(fields[7], "f");
    }

    #[test]
    fn batch_head_picks_highest_block() {
        let records = vec![record(5, "0xa"), record(9, "0xb"), record(7, "0xc")];
        let (block, hash) = batch_head(&records).unwrap();
        assert_eq!(block, 9);
        assert_eq!(hash, "0xblock9");
        assert!(batch_head(&[]).is_none());
    }

    // Integration tests require a running PostgreSQL instance.
    // Set DATABASE_URL to enable, e.g.
    // DATABASE_URL=postgresql://localhost/txindex_test cargo test -- --ignored

    async fn connect() -> PostgresStore {
        let url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
        let store = PostgresStore::connect(&url).await.unwrap();
        store.init_schema().await.unwrap();
        store.rollback_to(0).await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn append_batch_is_idempotent() {
        let store = connect().await;
        let batch = vec![record(100, "0xt1"), record(100, "0xt2")];

        assert_eq!(store.append_batch(&batch).await.unwrap(), 2);
        assert_eq!(store.append_batch(&batch).await.unwrap(), 0);

        let cp = store.load_checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 100);
        assert_eq!(cp.block_hash, "0xblock100");
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn bulk_ingest_then_rollback() {
        let store = connect().await;
        let batch: Vec<TxRecord> = (100..110)
            .map(|b| record(b, &format!("0xbulk{b}")))
            .collect();

        assert_eq!(store.bulk_ingest(&batch).await.unwrap(), 10);
        // Replay inserts nothing new.
        assert_eq!(store.bulk_ingest(&batch).await.unwrap(), 0);

        let deleted = store.rollback_to(105).await.unwrap();
        assert_eq!(deleted, 5);

        let cp = store.load_checkpoint().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 104);
        assert_eq!(cp.block_hash, "0xblock104", "hash recovered from surviving rows");
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn rollback_to_zero_clears_checkpoint() {
        let store = connect().await;
        store.append_batch(&[record(5, "0xt5")]).await.unwrap();

        store.rollback_to(0).await.unwrap();
        assert!(store.load_checkpoint().await.unwrap().is_none());
    }
}
