use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use airdrop_distributor::cli::Cli;
use airdrop_distributor::config::{Config, LogFormat};
use airdrop_distributor::{AlloyAirdropContract, AirdropRunner, ProgressReporter, RunSettings, RunStatus};

/// Every recipient served, or dry run finished
const EXIT_COMPLETE: u8 = 0;
/// Run could not start or was aborted
const EXIT_FATAL: u8 = 1;
/// Run finished but some recipients are still owed tokens
const EXIT_INCOMPLETE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(RunStatus::Complete) | Ok(RunStatus::DryRun) => ExitCode::from(EXIT_COMPLETE),
        Ok(RunStatus::Incomplete) => ExitCode::from(EXIT_INCOMPLETE),
        Err(e) => {
            error!("Airdrop failed: {:#}", e);
            eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<RunStatus> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    cli.apply(&mut config);

    init_tracing(&config);
    config.validate()?;
    info!("Configuration loaded successfully");

    let private_key = if config.submission.dry_run {
        config.private_key().ok()
    } else {
        Some(config.private_key()?)
    };
    let client = AlloyAirdropContract::new(
        &config.chain.rpc_url,
        private_key,
        config.contract_address()?,
        config.chain.chain_id,
    )?;

    let mut reporter = match &config.logging.audit_log {
        Some(path) => ProgressReporter::with_audit_log(path)?,
        None => ProgressReporter::new(),
    };

    // the snapshot is loaded and validated before the first RPC request
    let runner = AirdropRunner::new(Arc::new(client), RunSettings::from_config(&config)?);
    let result = runner
        .run_from_path(&config.distribution.snapshot_path, &mut reporter)
        .await;

    let summary = reporter.finish()?;
    println!();
    summary.print();

    let outcome = result?;
    match outcome.status {
        RunStatus::Complete => println!("{}", "✓ Airdrop complete".bright_green().bold()),
        RunStatus::Incomplete => println!(
            "{}",
            "⚠ Airdrop incomplete, re-run to retry the remaining recipients".bright_yellow().bold()
        ),
        RunStatus::DryRun => println!("{}", "Dry run finished, nothing was sent".bright_cyan()),
    }

    Ok(outcome.status)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
