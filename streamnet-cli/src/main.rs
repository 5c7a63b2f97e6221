//! # streamnet CLI
//!
//! Runs the built-in demonstration networks and inspects the runtime
//! configuration.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::Demo;
use std::path::PathBuf;
use streamnet_runtime::RuntimeConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a runtime configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demonstration network on generated input
    Run {
        /// Network to run
        #[arg(long, value_enum, default_value_t = Demo::Pipeline)]
        demo: Demo,

        /// Number of input records
        #[arg(long, default_value_t = 10)]
        records: usize,

        /// Print output records as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

fn init_tracing(config: &RuntimeConfig, verbose: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match &config.log_filter {
            Some(directives) => EnvFilter::try_new(directives)
                .with_context(|| format!("Invalid log filter '{}'", directives))?,
            None => EnvFilter::new(if verbose { "debug" } else { "info" }),
        },
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose)?;

    match cli.command {
        Commands::Run {
            demo,
            records,
            json,
        } => commands::run_demo(config, demo, records, json).await,
        Commands::Config => commands::show_config(&config),
    }
}
