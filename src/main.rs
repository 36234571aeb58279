// src/main.rs

//! Command-line driver that exercises a connection pool against a live
//! backend.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use connpool::config::{Settings, StressSettings};
use connpool::logging::init_logging;
use connpool::{ConnectionPool, TcpConnectionFactory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Command-line arguments for connpool
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// JSON settings file (backend, pool and stress sections)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Override the backend host
    #[clap(long)]
    host: Option<String>,

    /// Override the backend port
    #[clap(long)]
    port: Option<u16>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Acquire and release one connection repeatedly and report the elapsed time.
    Check {
        /// Number of acquire/release cycles
        #[clap(long, default_value = "10000")]
        iterations: usize,
    },
    /// Hammer the pool from many tasks and verify the ledger balances.
    Stress {
        /// Number of concurrent worker tasks
        #[clap(long)]
        tasks: Option<usize>,
        /// Test duration in seconds
        #[clap(long)]
        duration: Option<u64>,
    },
    /// Start the pool and print its statistics as JSON.
    Stats,
}

#[derive(Default)]
struct StressTotals {
    acquired: AtomicU64,
    released: AtomicU64,
    invalidated: AtomicU64,
    failed: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(host) = args.host {
        settings.backend.host = host;
    }
    if let Some(port) = args.port {
        settings.backend.port = port;
    }

    info!("Starting connpool v{}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", settings.backend.address());

    let config = settings.pool.to_pool_config()?;
    let factory = TcpConnectionFactory::new(settings.backend.clone());
    let pool = ConnectionPool::new(config, factory)?;
    pool.start().await?;

    let outcome = match args.command {
        Command::Check { iterations } => run_check(&pool, iterations).await,
        Command::Stress { tasks, duration } => {
            let mut stress = settings.stress.clone();
            if let Some(tasks) = tasks {
                stress.num_threads = tasks;
            }
            if let Some(duration) = duration {
                stress.duration_secs = duration;
            }
            run_stress(&pool, stress).await
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&pool.stats())?);
            Ok(())
        }
    };

    pool.shutdown().await;
    outcome
}

async fn run_check(pool: &ConnectionPool<TcpConnectionFactory>, iterations: usize) -> Result<()> {
    let start = Instant::now();
    for _ in 0..iterations {
        let conn = pool.get().await?;
        conn.release().await;
    }
    info!("{} acquire/release cycles in {:?}", iterations, start.elapsed());
    Ok(())
}

async fn run_stress(pool: &ConnectionPool<TcpConnectionFactory>, stress: StressSettings) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(stress.duration_secs);
    let invalidate_ratio = stress.invalidate_ratio.clamp(0.0, 1.0);
    let totals = Arc::new(StressTotals::default());
    info!(
        "Stress test: {} tasks for {}s, invalidating {:.0}% of borrows",
        stress.num_threads,
        stress.duration_secs,
        invalidate_ratio * 100.0
    );

    let reporter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                match serde_json::to_string(&pool.stats()) {
                    Ok(json) => info!("Pool stats: {}", json),
                    Err(e) => warn!("Failed to serialize pool stats: {}", e),
                }
            }
        })
    };

    let started = Instant::now();
    let mut workers = Vec::with_capacity(stress.num_threads);
    for task_id in 0..stress.num_threads {
        let pool = pool.clone();
        let totals = Arc::clone(&totals);
        workers.push(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            while Instant::now() < deadline {
                match pool.acquire().await {
                    Ok(conn) => {
                        totals.acquired.fetch_add(1, Ordering::Relaxed);
                        tokio::time::sleep(Duration::from_millis(rng.gen_range(1..=5))).await;
                        if rng.gen_bool(invalidate_ratio) {
                            pool.invalidate(conn).await;
                            totals.invalidated.fetch_add(1, Ordering::Relaxed);
                        } else {
                            pool.release(conn).await;
                            totals.released.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        totals.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("Task {} failed to acquire a connection: {}", task_id, e);
                    }
                }
                tokio::time::sleep(Duration::from_millis(rng.gen_range(10..=100))).await;
            }
        }));
    }

    for worker in workers {
        worker.await.context("stress worker panicked")?;
    }
    reporter.abort();

    let acquired = totals.acquired.load(Ordering::Relaxed);
    let released = totals.released.load(Ordering::Relaxed);
    let invalidated = totals.invalidated.load(Ordering::Relaxed);
    let failed = totals.failed.load(Ordering::Relaxed);
    let stats = pool.stats();

    info!(
        "Stress test completed in {:?}: {} acquired, {} released, {} invalidated, {} failed",
        started.elapsed(),
        acquired,
        released,
        invalidated,
        failed
    );
    info!("Final pool stats: {}", serde_json::to_string(&stats)?);

    if acquired != released + invalidated {
        bail!(
            "ledger mismatch: {} acquired but {} released and {} invalidated",
            acquired,
            released,
            invalidated
        );
    }
    if stats.lent != 0 || pool.outstanding_permits() != 0 {
        bail!(
            "pool did not settle: {} lent, {} permits outstanding",
            stats.lent,
            pool.outstanding_permits()
        );
    }
    Ok(())
}
