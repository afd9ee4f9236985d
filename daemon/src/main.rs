//! txindexd — the real-time ingestion daemon.
//!
//! No CLI arguments; configured entirely by environment (see
//! `txindex_core::Config`). Runs until signaled, then lets the in-flight
//! transaction finish, stops the health monitor, and drains the pool.

use std::env;
use std::process;

use tokio::sync::watch;

use txindex_core::{Config, IndexError};
use txindex_engine::{IngestConfig, IngestLoop};
use txindex_observability::{init_tracing, LogConfig};
use txindex_rpc::{RetryConfig, Transport, TransportConfig};
use txindex_storage::{PostgresOptions, PostgresStore};

#[tokio::main]
async fn main() {
    // Structured JSON by default — this is a daemon; set LOG_JSON=0 for a
    // human-readable stream during development.
    let json = env::var("LOG_JSON").map(|v| v != "0").unwrap_or(true);
    init_tracing(&LogConfig {
        level: "info".into(),
        json,
    });

    if let Err(e) = run().await {
        tracing::error!(error = %e, "daemon exited with error");
        process::exit(1);
    }
}

async fn run() -> Result<(), IndexError> {
    let config = Config::from_env()?;

    let store = PostgresStore::connect_with_options(
        &config.database_url(),
        PostgresOptions {
            max_connections: config.db_max_connections,
            ..Default::default()
        },
    )
    .await?;
    store.init_schema().await?;

    let transport = Transport::new(
        config.rpc_urls.clone(),
        TransportConfig {
            retry: RetryConfig {
                max_attempts: config.rpc_max_attempts,
                ..Default::default()
            },
            health_interval: config.health_interval,
            stale_threshold: config.stale_threshold,
            ..Default::default()
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = transport.spawn_health_monitor(shutdown_rx.clone());

    match transport.chain_id().await {
        Ok(id) => tracing::info!(
            chain_id = id,
            endpoints = config.rpc_urls.len(),
            "connected to chain"
        ),
        Err(e) => tracing::warn!(error = %e, "could not read chain id at startup"),
    }

    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received — draining");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    let mut ingest = IngestLoop::new(
        transport,
        store.clone(),
        IngestConfig {
            poll_interval: config.poll_interval,
            error_backoff: config.error_backoff,
        },
    );
    let result = ingest.run(shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    let _ = monitor.await;
    store.close().await;
    result
}
