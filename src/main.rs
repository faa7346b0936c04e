// src/main.rs

mod config;
mod counting;
mod detection;
mod pipeline;
mod run_coordinator;
mod schedule;
mod storage;
mod transcode;
mod types;
mod video_processor;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use detection::YoloPersonTracker;
use run_coordinator::{RunCoordinator, RunOutcome};
use schedule::{ResetOutcome, ResetSchedule};
use types::Config;

#[derive(Debug, Parser)]
#[command(name = "occupancy-counter", version, about = "Count people crossing a line in recorded room video")]
struct Cli {
    /// Path to the YAML configuration
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process the oldest unprocessed clip (default)
    Run,
    /// Zero the stored totals; meant for a daily cron trigger
    Reset {
        /// Skip the reset-time check
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("occupancy_counter={},ort=warn", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (records, objects) = storage::from_config(&config.storage)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("🚪 Occupancy counter starting");
            let coordinator = RunCoordinator::new(&config, records.as_ref(), objects.as_ref());
            match coordinator.run(|| YoloPersonTracker::new(&config)).await? {
                RunOutcome::NoNewSource => info!("Nothing to do"),
                RunOutcome::Completed(record) => info!(
                    "Stored record {} (total {}) for {}",
                    record.run_id, record.total_count, record.video_name
                ),
            }
        }
        Command::Reset { force } => {
            let now = schedule::site_now(&config.schedule)?;
            let outcome = if force {
                schedule::reset_now(records.as_ref(), now).await?
            } else {
                schedule::run_scheduled_reset(
                    records.as_ref(),
                    ResetSchedule::from_config(&config.schedule),
                    now,
                )
                .await?
            };
            if outcome == ResetOutcome::NotDue {
                info!("Reset not due at {}; use --force to reset anyway", now.format("%H:%M"));
            }
        }
    }

    Ok(())
}
