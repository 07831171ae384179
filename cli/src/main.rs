//! CLI for Vigil
//!
//! Commands:
//! - run: evaluate the alerts of one period for one site
//! - check: evaluate a single trigger condition on ad-hoc values
//! - sites: list site ids that have alerts
//! - comparables: list the valid period comparisons

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vigil_engine::config::EngineConfig;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil - custom alert evaluation", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate all alerts of a period for one site
    Run(commands::run::RunArgs),

    /// Evaluate one trigger condition against given values
    Check(commands::check::CheckArgs),

    /// List site ids that have at least one alert
    Sites(commands::sites::SitesArgs),

    /// List valid period comparisons
    Comparables(commands::comparables::ComparablesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    init_tracing(cli.verbose, cli.log_json || config.log_json);

    match cli.command {
        Commands::Run(args) => commands::run::run(args, config).await,
        Commands::Check(args) => commands::check::run(args),
        Commands::Sites(args) => commands::sites::run(args).await,
        Commands::Comparables(args) => commands::comparables::run(args),
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}
