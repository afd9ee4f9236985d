//! txindex CLI — offline maintenance for the transaction store.
//!
//! Usage:
//! ```bash
//! txindex rollback 18000000
//! txindex backfill --start 17000000 --end 17000500 --batch-size 25
//! ```
//!
//! Exit code 0 on success, 1 on any precondition or operation failure.

use std::env;
use std::process;

use tokio::sync::watch;

use txindex_core::{Config, IndexError};
use txindex_engine::{run_backfill, run_rollback};
use txindex_observability::{init_tracing, LogConfig};
use txindex_rpc::{RetryConfig, Transport, TransportConfig};
use txindex_storage::{PostgresOptions, PostgresStore};

#[tokio::main]
async fn main() {
    init_tracing(&LogConfig::default());

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "rollback" => cmd_rollback(&args[2..]).await,
        "backfill" => cmd_backfill(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("txindex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("txindex {}", env!("CARGO_PKG_VERSION"));
    println!("Maintenance utility for the txindex transaction store\n");
    println!("USAGE:");
    println!("    txindex <COMMAND>\n");
    println!("COMMANDS:");
    println!("    rollback <block>                      Revert the store to <block>");
    println!("    backfill --start <N> --end <M>        Fetch and commit blocks [N, M]");
    println!("             [--batch-size <K>]           Blocks per bulk commit (default 10)");
    println!("    version                               Print version");
    println!("    help                                  Print this help");
    println!("\nConnection settings come from the environment: RPC_URLS, DB_HOST,");
    println!("DB_PORT, DB_USER, DB_PASSWORD, DB_NAME.");
}

async fn cmd_rollback(args: &[String]) -> Result<(), IndexError> {
    let target: u64 = args
        .first()
        .ok_or_else(|| IndexError::Precondition("rollback requires a block number".into()))?
        .parse()
        .map_err(|_| {
            IndexError::Precondition("block number must be a non-negative integer".into())
        })?;

    let config = Config::from_env()?;
    let store = connect(&config).await?;
    let outcome = run_rollback(&store, target).await;
    store.close().await;

    match outcome? {
        Some(cp) => println!(
            "rolled back to block {target}; checkpoint now at {} ({})",
            cp.block_number, cp.block_hash
        ),
        None => println!("rolled back to genesis; checkpoint cleared"),
    }
    Ok(())
}

async fn cmd_backfill(args: &[String]) -> Result<(), IndexError> {
    let opts = BackfillArgs::parse(args)?;

    let config = Config::from_env()?;
    let store = connect(&config).await?;
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
    let monitor = transport.spawn_health_monitor(shutdown_rx);

    let outcome = run_backfill(&transport, &store, opts.start, opts.end, opts.batch_size).await;

    let _ = shutdown_tx.send(true);
    let _ = monitor.await;
    store.close().await;

    let stats = outcome?;
    println!(
        "backfilled {} blocks: {} rows inserted, {} records diverted",
        stats.blocks, stats.records, stats.invalid
    );
    Ok(())
}

async fn connect(config: &Config) -> Result<PostgresStore, IndexError> {
    let store = PostgresStore::connect_with_options(
        &config.database_url(),
        PostgresOptions {
            max_connections: config.db_max_connections,
            ..Default::default()
        },
    )
    .await?;
    store.init_schema().await?;
    Ok(store)
}

// ─── Argument parsing ────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
struct BackfillArgs {
    start: u64,
    end: u64,
    batch_size: u64,
}

impl BackfillArgs {
    fn parse(args: &[String]) -> Result<Self, IndexError> {
        let mut start = None;
        let mut end = None;
        let mut batch_size = 10u64;

        let mut it = args.iter();
        while let Some(flag) = it.next() {
            match flag.as_str() {
                "--start" => start = Some(parse_block(flag, it.next())?),
                "--end" => end = Some(parse_block(flag, it.next())?),
                "--batch-size" => batch_size = parse_block(flag, it.next())?,
                other => {
                    return Err(IndexError::Precondition(format!("unknown flag: {other}")));
                }
            }
        }

        let start =
            start.ok_or_else(|| IndexError::Precondition("--start is required".into()))?;
        let end = end.ok_or_else(|| IndexError::Precondition("--end is required".into()))?;
        if start > end {
            return Err(IndexError::Precondition(format!(
                "--start {start} must not exceed --end {end}"
            )));
        }
        if batch_size == 0 {
            return Err(IndexError::Precondition("--batch-size must be positive".into()));
        }

        Ok(Self {
            start,
            end,
            batch_size,
        })
    }
}

fn parse_block(flag: &str, value: Option<&String>) -> Result<u64, IndexError> {
    value
        .ok_or_else(|| IndexError::Precondition(format!("{flag} requires a value")))?
        .parse()
        .map_err(|_| {
            IndexError::Precondition(format!("{flag} must be a non-negative integer"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn backfill_args_full() {
        let parsed = BackfillArgs::parse(&args(&[
            "--start",
            "100",
            "--end",
            "200",
            "--batch-size",
            "25",
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            BackfillArgs {
                start: 100,
                end: 200,
                batch_size: 25
            }
        );
    }

    #[test]
    fn backfill_batch_size_defaults_to_ten() {
        let parsed = BackfillArgs::parse(&args(&["--start", "0", "--end", "5"])).unwrap();
        assert_eq!(parsed.batch_size, 10);
    }

    #[test]
    fn backfill_rejects_inverted_range() {
        let err = BackfillArgs::parse(&args(&["--start", "10", "--end", "5"])).unwrap_err();
        assert!(matches!(err, IndexError::Precondition(_)));
    }

    #[test]
    fn backfill_rejects_missing_start() {
        let err = BackfillArgs::parse(&args(&["--end", "5"])).unwrap_err();
        assert!(matches!(err, IndexError::Precondition(_)));
    }

    #[test]
    fn backfill_rejects_garbage_numbers() {
        let err =
            BackfillArgs::parse(&args(&["--start", "-3", "--end", "5"])).unwrap_err();
        assert!(matches!(err, IndexError::Precondition(_)));
    }
}
