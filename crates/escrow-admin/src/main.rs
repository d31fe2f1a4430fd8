//! Operator CLI for the escrow marketplace core
//!
//! # Usage
//!
//! ```bash
//! # Print the grade table
//! escrow-admin table
//!
//! # Grade a hypothetical user
//! escrow-admin grade --safe 12 --rating 4.3 --trades 20
//!
//! # Run an in-memory marketplace scenario
//! escrow-admin simulate --sales 8
//!
//! # Repair cached grades in a store snapshot
//! ESCROW_MAX_CAS_RETRIES=10 escrow-admin --config escrow.toml recompute --snapshot state.json
//! ```

mod config;
mod simulate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AdminConfig;
use escrow_core::{
    Actor, GradeEngine, Marketplace, MemoryStore, SharedStore, TracingNotifier, UserStats,
};
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (ESCROW_* variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every grade and its requirement
    Table,

    /// Compute grade and progress for the given statistics
    Grade {
        #[arg(long, default_value_t = 0)]
        safe: u32,
        #[arg(long, default_value_t = 0.0)]
        rating: f64,
        #[arg(long, default_value_t = 0)]
        disputes: u32,
        #[arg(long, default_value_t = 0)]
        trades: u32,
    },

    /// Run a scripted marketplace session in memory and print the outcome
    Simulate {
        /// Clean sales before the disputed one
        #[arg(long, default_value_t = 5)]
        sales: u32,
        /// Review score the buyer leaves on each sale
        #[arg(long, default_value_t = 5)]
        score: u8,
    },

    /// Re-derive every cached grade in a store snapshot
    Recompute {
        /// JSON snapshot produced by the memory store
        #[arg(long)]
        snapshot: PathBuf,
        /// Report changes without writing the snapshot back
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = AdminConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Table => print_table(),
        Command::Grade {
            safe,
            rating,
            disputes,
            trades,
        } => {
            let stats = UserStats {
                safe_transaction_count: safe,
                total_trades: trades,
                average_rating: rating,
                dispute_count: disputes,
                review_count: trades,
            };
            let report = GradeEngine::new().progress(&stats);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Simulate { sales, score } => {
            let summary = simulate::run(&config, sales, score).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Recompute { snapshot, dry_run } => recompute(&config, &snapshot, dry_run).await,
    }
}

fn print_table() -> Result<()> {
    let engine = GradeEngine::new();
    println!(
        "{:<6} {:>6} {:>7} {:>13} {:>7}",
        "grade", "safe", "rating", "dispute-free", "trades"
    );
    for tier in engine.table().tiers() {
        let r = &tier.requirement;
        println!(
            "{:<6} {:>6} {:>7.1} {:>13} {:>7}",
            tier.grade, r.safe_transactions, r.average_rating, r.dispute_free, r.total_trades
        );
    }
    Ok(())
}

async fn recompute(config: &AdminConfig, snapshot: &Path, dry_run: bool) -> Result<()> {
    let store = Arc::new(
        MemoryStore::load_snapshot(snapshot)
            .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?,
    );
    let shared: SharedStore = store.clone();
    let market = Marketplace::new(shared, config.engine.clone(), Arc::new(TracingNotifier));

    let admin = Actor::admin(config.operator_id.clone());
    let summary = market
        .recompute_all_grades(&admin)
        .await
        .context("Grade recomputation failed")?;
    info!(
        scanned = summary.users_scanned,
        changed = summary.users_changed,
        repaired = summary.stats_repaired,
        "Recompute finished"
    );

    if dry_run {
        info!("Dry run, snapshot left untouched");
    } else {
        store
            .save_snapshot(snapshot)
            .with_context(|| format!("Failed to write snapshot {}", snapshot.display()))?;
    }

    println!(
        "{}",
        serde_json::json!({
            "users_scanned": summary.users_scanned,
            "users_changed": summary.users_changed,
            "stats_repaired": summary.stats_repaired,
            "written": !dry_run,
        })
    );
    Ok(())
}
