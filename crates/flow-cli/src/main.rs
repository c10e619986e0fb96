//! `flow`: command-line interface for Flow 2 air quality monitors.

mod cli;
mod commands;
mod config;
mod format;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{cmd_battery, cmd_config, cmd_discover, cmd_history, cmd_read};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Quiet mode suppresses info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let config = Config::load_from(&config_path);
    let quiet = cli.quiet;

    match cli.command {
        Commands::Discover {
            timeout,
            all,
            output,
        } => cmd_discover(timeout, all, output.format, output.output.as_ref(), quiet).await,
        Commands::Read {
            device,
            duration,
            output,
        } => {
            cmd_read(
                &device,
                duration,
                output.format,
                output.output.as_ref(),
                quiet,
                &config,
            )
            .await
        }
        Commands::Battery { device, output } => {
            cmd_battery(&device, output.format, output.output.as_ref(), quiet, &config).await
        }
        Commands::History {
            device,
            wait,
            preview,
            output,
        } => {
            cmd_history(
                &device,
                wait,
                preview,
                output.format,
                output.output.as_ref(),
                quiet,
                &config,
            )
            .await
        }
        Commands::Config { action } => cmd_config(action, &config_path),
    }
}
