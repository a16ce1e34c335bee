//! CLI command definitions for fluxbatch.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::config::BatchConfig;
use crate::dispatch::{SiteCollaborators, SiteDispatcher, SiteStatus};
use crate::handler::StandardCompliance;
use crate::levels::Level;
use crate::session::{BatchSession, CancelToken, RunMode};
use std::sync::Arc;

/// Unattended batch orchestrator for multi-level flux data processing.
#[derive(Parser)]
#[command(name = "fluxbatch")]
#[command(about = "Run a declared sequence of processing levels over control files")]
#[command(version)]
#[command(
    long_about = "fluxbatch drives a declared sequence of processing levels (l1..l6, \
concatenate, climatology, cpd_*, mpt and export formats) over per-unit control files, \
without user interaction. Individual unit failures are logged and skipped; Ctrl-C \
requests a cooperative stop at the next manifest boundary.\n\nExample usage:\n  \
fluxbatch run --config batch.yaml\n  fluxbatch sites --config batch.yaml --pool-size 5"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the declared level sequence over each level's control file set.
    Run(RunArgs),

    /// Fan the full pipeline out across sites with a bounded worker pool.
    ///
    /// Each site's entries run sequentially in ascending ordinal order;
    /// sites run in parallel and fail independently.
    Sites(SitesArgs),

    /// Print the known processing levels.
    Levels,
}

/// Arguments for `fluxbatch run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Batch configuration file.
    #[arg(short, long)]
    pub config: PathBuf,
}

/// Arguments for `fluxbatch sites`.
#[derive(Parser, Debug)]
pub struct SitesArgs {
    /// Batch configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the configured worker pool size.
    #[arg(long)]
    pub pool_size: Option<usize>,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes the parsed command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_levels(args).await,
        Commands::Sites(args) => run_sites(args).await,
        Commands::Levels => {
            for level in Level::ALL {
                println!("{level}");
            }
            Ok(())
        }
    }
}

/// Wires Ctrl-C to a cooperative stop request.
fn install_stop_handler(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing the current unit before exiting");
            token.request_stop();
        }
    });
}

async fn run_levels(args: RunArgs) -> anyhow::Result<()> {
    let config = BatchConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate_for_run()?;

    let registry = config.build_registry()?;
    let plotter = config.build_plotter()?;

    let session = BatchSession::new(RunMode::Batch, config.options.levels.clone());
    install_stop_handler(session.token());

    let reports = session
        .run_levels(&config, &registry, &StandardCompliance, plotter.as_ref())
        .await;

    let completed: usize = reports.iter().map(|report| report.completed()).sum();
    let skipped: usize = reports
        .iter()
        .map(|report| report.skipped_or_failed())
        .sum();
    info!(levels = reports.len(), completed, skipped, "Batch run summary");

    Ok(())
}

async fn run_sites(args: SitesArgs) -> anyhow::Result<()> {
    let mut config = BatchConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(pool_size) = args.pool_size {
        config.pool_size = pool_size;
    }
    config.validate_for_sites()?;

    let collaborators = SiteCollaborators {
        registry: Arc::new(config.build_registry()?),
        compliance: Arc::new(StandardCompliance),
        plotter: config.build_plotter()?,
    };

    let token = CancelToken::new();
    install_stop_handler(token.clone());

    let dispatcher = SiteDispatcher::new(config.pool_size);
    let reports = dispatcher
        .run_sites(&token, &config.sites, collaborators)
        .await;

    let completed = reports
        .iter()
        .filter(|report| report.status == SiteStatus::Completed)
        .count();
    info!(
        sites = reports.len(),
        completed,
        pool_size = dispatcher.pool_size(),
        "Site batch summary"
    );

    Ok(())
}
