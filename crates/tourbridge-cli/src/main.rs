use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tourbridge_sync::{RunSelection, SyncConfig, TaskRegistry};

#[derive(Debug, Parser)]
#[command(name = "tourbridge")]
#[command(about = "Synchronize showcase tours into local categories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one synchronization now.
    Sync {
        /// Task from the task registry.
        #[arg(long, conflicts_with = "showcase")]
        task: Option<String>,
        /// Showcase key to synchronize directly.
        #[arg(long)]
        showcase: Option<String>,
        /// Read tours from a fixture file instead of the HTTP API.
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// Use a throwaway in-memory store.
        #[arg(long)]
        memory: bool,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Apply database migrations.
    Migrate,
    /// Run every enabled task on its cron schedule until interrupted.
    Schedule {
        #[arg(long)]
        memory: bool,
    },
    /// List configured tasks.
    Tasks,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            task,
            showcase,
            fixture,
            memory,
            json,
        } => {
            let summary = tourbridge_sync::run_sync_once_from_env(RunSelection {
                task_id: task,
                showcase_key: showcase,
                fixture,
                in_memory: memory,
            })
            .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "sync {}: run_id={} showcase={} tours={} upserted={} errors={}",
                    summary.status,
                    summary.run_id,
                    summary.showcase,
                    summary.remote_tours,
                    summary.upserted,
                    summary.item_errors
                );
            }
            // exit codes are 0..=2, always representable
            Ok(ExitCode::from(summary.status.exit_code() as u8))
        }
        Commands::Migrate => {
            tourbridge_sync::migrate_from_env().await?;
            println!("migrations applied");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schedule { memory } => {
            tourbridge_sync::run_scheduler_from_env(memory).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tasks => {
            let config = SyncConfig::from_env();
            let registry = TaskRegistry::load(&config.tasks_path())?;
            for task in &registry.tasks {
                println!(
                    "{}\t{}\t{}\t{}",
                    task.task_id,
                    if task.showcase_key.is_empty() {
                        "<unset>"
                    } else {
                        task.showcase_key.as_str()
                    },
                    task.cron,
                    if task.enabled { "enabled" } else { "disabled" }
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
