//! Refund contestation service binary.
//!
//! Periodically lists refund-pending orders and contests each eligible one.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use refund_contest_engine::DateRange;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refund_contest::config::MAX_DAYS_BACK;
use refund_contest::{ContestConfig, CycleRange, Ledger, Scheduler};

#[derive(Parser)]
#[command(name = "refund-contest")]
#[command(about = "Contest marketplace refund requests automatically", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run contestation cycles
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Days of history per cycle (overrides CONTEST_DAYS_BACK)
        #[arg(long, conflicts_with_all = ["start", "end"])]
        days_back: Option<u32>,

        /// First day of a fixed range (YYYY-MM-DD)
        #[arg(long, requires = "end")]
        start: Option<NaiveDate>,

        /// Last day of a fixed range (YYYY-MM-DD)
        #[arg(long, requires = "start")]
        end: Option<NaiveDate>,
    },

    /// Print processed-orders statistics
    Stats {
        /// Ledger file (overrides CONTEST_LEDGER_PATH)
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,refund_contest=debug,refund_contest_engine=debug".into());

    let json = std::env::var("CONTEST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before the log format is read
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            once,
            days_back,
            start,
            end,
        } => {
            let config = ContestConfig::from_env().context("Failed to load configuration")?;
            let range = match (start, end) {
                (Some(start), Some(end)) => CycleRange::Fixed(DateRange::new(start, end)?),
                _ => {
                    let days_back = days_back.unwrap_or(config.days_back);
                    if days_back > MAX_DAYS_BACK {
                        bail!("--days-back must be at most {}", MAX_DAYS_BACK);
                    }
                    CycleRange::Rolling { days_back }
                }
            };
            run(config, range, once).await
        }
        Commands::Stats { ledger, json } => {
            let path = ledger
                .or_else(|| std::env::var_os("CONTEST_LEDGER_PATH").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("data/processed_orders.json"));
            stats(&path, json)
        }
    }
}

async fn run(config: ContestConfig, range: CycleRange, once: bool) -> Result<()> {
    let provider = config.validate().context("Invalid configuration")?;
    tracing::info!(
        base_api_url = %config.base_api_url,
        provider = %provider,
        interval_secs = config.cycle_interval_secs,
        "Starting refund contestation service"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => tracing::error!(error = %e, "Failed to install CTRL+C handler"),
        }
    });

    let scheduler = Scheduler::from_config(&config, provider, range, shutdown_rx.clone())?;
    scheduler.log_ledger_stats("startup");

    if once {
        let summary = scheduler.run_cycle().await;
        scheduler.log_ledger_stats("final");
        if let Some(fatal) = summary?.fatal {
            bail!("Cycle failed at {}: {}", fatal.stage, fatal.message);
        }
        return Ok(());
    }

    scheduler.run_forever(shutdown_rx).await;
    scheduler.log_ledger_stats("final");
    Ok(())
}

fn stats(path: &Path, json: bool) -> Result<()> {
    let ledger = Ledger::open(path)?;
    let stats = ledger.stats();
    let today = chrono::Local::now().date_naive();

    if json {
        let value = serde_json::json!({
            "stats": stats,
            "processed_today": ledger.processed_today(today),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Ledger: {}", ledger.path().display());
        println!("Total processed: {}", stats.total_processed);
        println!("Successful: {}", stats.successful);
        println!("Failed: {}", stats.failed);
        println!("Processed today: {}", ledger.processed_today(today));
        match stats.last_processed {
            Some(at) => println!("Last processed: {}", at.to_rfc3339()),
            None => println!("Last processed: never"),
        }
    }

    Ok(())
}
