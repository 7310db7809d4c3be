//! `autocheckin` command line.
//!
//! - `check-in`: check in one reservation and print its result as JSON.
//! - `batch`: check in every reservation of a CSV file, one at a time.
//! - `providers`: list the configured airline flows.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autocheckin::batch::read_reservations;
use autocheckin::runner::{self, InProcessRunner, ProcessRunner};
use autocheckin::{
    DateOfBirth, ExecutionResult, Orchestrator, Provider, ReservationRequest, Settings,
    SettingsArgs,
};

#[derive(Parser)]
#[command(name = "autocheckin", about = "Airline web check-in automation", version)]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check in a single reservation.
    CheckIn {
        #[arg(long)]
        provider: Provider,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        reservation_code: String,
        #[arg(long)]
        email: String,
        /// DD-MM-YYYY
        #[arg(long)]
        date_of_birth: DateOfBirth,
    },
    /// Check in every reservation listed in a CSV file.
    Batch {
        file: PathBuf,
        /// Run sessions on worker threads instead of child processes.
        #[arg(long)]
        in_process: bool,
        /// Write all results to this JSON file.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List the airlines with a configured check-in flow.
    Providers {
        /// Print the full flow tables as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout carries only results.
fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::from(cli.settings);

    match cli.command {
        Command::CheckIn {
            provider,
            last_name,
            reservation_code,
            email,
            date_of_birth,
        } => {
            let request =
                ReservationRequest::new(last_name, reservation_code, email, date_of_birth, provider);
            let catalog = settings.load_catalog()?;
            let result = tokio::task::spawn_blocking(move || {
                runner::check_in(&catalog, &settings, &request)
            })
            .await
            .context("check-in worker panicked")?;

            println!("{}", serde_json::to_string(&result)?);
            Ok(ExitCode::from(result.exit_code()))
        }
        Command::Batch {
            file,
            in_process,
            report,
        } => {
            let requests = read_reservations(&file)?;
            let cooldown = settings.cooldown;
            let results = if in_process {
                let catalog = settings.load_catalog()?;
                Orchestrator::new(InProcessRunner::new(catalog, settings))
                    .with_cooldown(cooldown)
                    .run(&requests)
                    .await
            } else {
                // Fail fast on a broken catalog instead of once per child.
                settings.load_catalog()?;
                let runner = ProcessRunner::current_exe(settings)
                    .context("cannot locate the autocheckin executable")?;
                Orchestrator::new(runner)
                    .with_cooldown(cooldown)
                    .run(&requests)
                    .await
            };

            print_summary(&results);
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&results)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("cannot write report {}", path.display()))?;
                info!(report = %path.display(), "wrote batch report");
            }

            if results.iter().all(ExecutionResult::is_success) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Providers { json } => {
            let catalog = settings.load_catalog()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                for provider in catalog.providers() {
                    if let Some(template) = catalog.template(provider) {
                        println!(
                            "{:<12} {:>2} steps  {}",
                            provider.slug(),
                            template.steps.len(),
                            template.entry_url
                        );
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_summary(results: &[ExecutionResult]) {
    for r in results {
        let artifact = r
            .diagnostic_artifact
            .as_ref()
            .map(|p| format!(" [{}]", p.display()))
            .unwrap_or_default();
        println!(
            "{:<10} {:<12} {:?}: {}{}",
            r.reservation_code,
            r.provider.slug(),
            r.status,
            r.message,
            artifact
        );
    }
}
