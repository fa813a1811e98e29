use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use clickscore_worker::{app::ComponentRegistry, config::Config, scheduler::PassDaemon};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print Prometheus metrics to stdout after the command finishes
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one lifecycle pass: follow the active batch, then create one if idle
    Run,
    /// Run a pass every interval until Ctrl-C
    Watch {
        /// Seconds between passes (defaults to CLICKSCORE_TRIGGER_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Show the active batch, its remote progress and recent batches
    Status {
        /// Number of recent batches to list
        #[arg(long, default_value = "10")]
        recent: usize,
    },
    /// Ask the scoring service to cancel a batch
    Cancel { batch_id: String },
    /// Move a failed batch back to pending so the next pass ingests it again
    Retry { batch_id: String },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenvy::dotenv() {
        // A missing .env file is the normal case outside development.
        if !error.not_found() {
            eprintln!("failed to load .env: {error}");
        }
    }

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let registry =
        ComponentRegistry::build(config).context("failed to build component registry")?;
    let manager = registry.manager();

    let outcome = match cli.command {
        Command::Run => {
            let report = manager.run_once().await;
            print_json(&report)
        }
        Command::Watch { interval_secs } => {
            let every = interval_secs
                .map_or_else(|| registry.config().trigger_interval(), std::time::Duration::from_secs);
            info!(interval_secs = every.as_secs(), "watching scoring batches");
            let shutdown = async {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    warn!(error = %error, "failed to listen for Ctrl-C; stopping");
                }
            };
            PassDaemon::new(manager, every).run_until(shutdown).await;
            Ok(())
        }
        Command::Status { recent } => match manager.status_report(recent).await {
            Ok(report) => print_json(&report),
            Err(error) => Err(error).context("failed to build status report"),
        },
        Command::Cancel { batch_id } => manager
            .cancel_job(&batch_id)
            .await
            .with_context(|| format!("failed to cancel batch {batch_id}")),
        Command::Retry { batch_id } => match manager.retry_failed_job(&batch_id).await {
            Ok(job) => print_json(&job),
            Err(error) => Err(error).with_context(|| format!("failed to retry batch {batch_id}")),
        },
    };

    if cli.print_metrics {
        print!("{}", registry.telemetry().render_prometheus());
    }
    if let Err(error) = &outcome {
        error!(error = ?error, "command failed");
    }
    registry.telemetry().shutdown();
    outcome
}
