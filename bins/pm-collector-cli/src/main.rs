//! Hourly Polymarket Collector CLI
//!
//! Commands:
//! - `run`: Track the rolling hourly BTC markets and record samples until Ctrl+C
//! - `resolve`: Discover the current hourly market once and print its metadata
//!
//! # Usage
//! ```bash
//! # Collect into ./data_collection
//! pm_collector run
//! pm_collector run --data-root /var/lib/pm --poll-interval-ms 500
//!
//! # Which market would be tracked right now / at a given time
//! pm_collector resolve
//! pm_collector resolve --asof 2025-11-28T14:30:00Z --out resolved.json
//! ```
//!
//! Every setting can also come from `PM_COLLECTOR_*` environment variables;
//! command-line flags win.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use market_collector::{CollectorConfig, DiscoveryOutcome, SessionController};

#[derive(Parser)]
#[command(name = "pm_collector")]
#[command(about = "Hourly Polymarket market data collector")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collector until Ctrl+C
    Run {
        /// Root directory for session record files
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Binance symbol for spot price and strike
        #[arg(long)]
        symbol: Option<String>,

        /// Hours added to now before computing the first candidate slug
        #[arg(long)]
        look_ahead_hours: Option<i64>,

        /// Sampling cadence while tracking, in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },

    /// Discover the current hourly market once
    Resolve {
        /// Reference time for discovery (RFC 3339, default: now)
        #[arg(long)]
        asof: Option<String>,

        /// Output file for the metadata JSON (optional, defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let mut config = CollectorConfig::from_env()?;

    match cli.command {
        Commands::Run { data_root, symbol, look_ahead_hours, poll_interval_ms } => {
            if let Some(root) = data_root {
                config.data_root = root;
            }
            if let Some(symbol) = symbol {
                config.symbol = symbol;
            }
            if let Some(hours) = look_ahead_hours {
                config.look_ahead_hours = hours;
            }
            if let Some(ms) = poll_interval_ms {
                config.poll_interval = Duration::from_millis(ms);
            }
            run_collector(config).await
        }
        Commands::Resolve { asof, out } => run_resolve(config, asof, out).await,
    }
}

async fn run_collector(config: CollectorConfig) -> Result<()> {
    info!("=== Hourly Market Collector ===");
    info!("Gamma API: {}", config.gamma_base_url);
    info!("CLOB API: {}", config.clob_base_url);
    info!("Binance API: {} ({})", config.binance_base_url, config.symbol);
    info!("Data root: {}", config.data_root.display());
    info!("");

    // Setup Ctrl+C handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down...");
        shutdown_clone.store(true, Ordering::Relaxed);
    });

    let mut controller = SessionController::from_config(&config, shutdown)?;
    controller.run().await?;

    let stats = controller.stats();
    info!("");
    info!("=== Summary ===");
    info!("Sessions completed: {}", stats.sessions_completed);
    info!("Sessions aborted: {}", stats.sessions_aborted);
    info!("Discovery attempts: {}", stats.discovery_attempts);
    info!("Rows written: {}", stats.rows_written);
    info!("Skipped ticks: {}", stats.skipped_ticks);

    Ok(())
}

async fn run_resolve(config: CollectorConfig, asof: Option<String>, out: Option<PathBuf>) -> Result<()> {
    // Parse asof time
    let asof_time: DateTime<Utc> = match asof {
        Some(ref s) => DateTime::parse_from_rfc3339(s)
            .map_err(|e| anyhow::anyhow!("Invalid asof time '{}': {}", s, e))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    info!("=== Market Resolver ===");
    info!("Gamma API: {}", config.gamma_base_url);
    info!("Reference time (asof): {}", asof_time);
    info!("");

    let controller = SessionController::from_config(&config, Arc::new(AtomicBool::new(false)))?;
    let attempts = controller.probe(asof_time).await;

    for (identifier, outcome) in &attempts {
        match outcome {
            DiscoveryOutcome::Found(meta) => info!("{}: found, settles {}", identifier, meta.settlement_time),
            DiscoveryOutcome::NotFoundYet => info!("{}: not listed", identifier),
            DiscoveryOutcome::Failure(reason) => warn!("{}: {}", identifier, reason),
        }
    }

    let metadata = attempts.into_iter().find_map(|(_, outcome)| match outcome {
        DiscoveryOutcome::Found(meta) if meta.settlement_time > asof_time => Some(meta),
        _ => None,
    });

    let Some(metadata) = metadata else {
        anyhow::bail!("No active hourly market found for {}", asof_time);
    };

    info!("");
    info!("=== Resolution SUCCESS ===");
    info!("Slug: {}", metadata.identifier);
    info!("Question: {}", metadata.question);
    info!("Yes token: {}", metadata.instrument_handle);
    info!("Settlement: {}", metadata.settlement_time);
    info!("URL: {}", metadata.market_url());

    let json_output = serde_json::to_string_pretty(&metadata)?;

    // Write to file or stdout
    if let Some(out_path) = out {
        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&out_path, &json_output).await?;
        info!("");
        info!("Output written to: {}", out_path.display());
    } else {
        println!("{}", json_output);
    }

    Ok(())
}
