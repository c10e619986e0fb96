//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device address (MAC address, UUID or name), or use FLOW_DEVICE env var
    #[arg(short, long, env = "FLOW_DEVICE")]
    pub device: Option<String>,

    /// Connection timeout in seconds (overrides config)
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,
}

/// Reusable output arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "flow")]
#[command(author, version, about = "CLI for Flow 2 air quality monitors", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use a config file other than the default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby Flow devices
    Discover {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Show every BLE device, not just Flow devices
        #[arg(short, long)]
        all: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Stream live PM2.5 readings
    Read {
        #[command(flatten)]
        device: DeviceArgs,

        /// How long to stream, in seconds
        #[arg(long, default_value = "30")]
        duration: u64,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Read the battery level
    Battery {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Request stored history and print the blocks received
    History {
        #[command(flatten)]
        device: DeviceArgs,

        /// How long to wait for history blocks, in seconds
        #[arg(long, default_value = "15")]
        wait: u64,

        /// Bytes of each block to show in text output
        #[arg(long, default_value = "16")]
        preview: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the current configuration
    Show,
    /// Set the default device
    SetDevice {
        /// Device address or name
        device: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_read() {
        let cli = Cli::try_parse_from([
            "flow", "read", "--device", "AA:BB", "--duration", "5", "-f", "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Read {
                device,
                duration,
                output,
            } => {
                assert_eq!(device.device.as_deref(), Some("AA:BB"));
                assert_eq!(duration, 5);
                assert_eq!(output.format, OutputFormat::Json);
            }
            _ => panic!("expected read"),
        }
    }

    #[test]
    fn test_parse_discover_defaults() {
        let cli = Cli::try_parse_from(["flow", "discover"]).unwrap();
        match cli.command {
            Commands::Discover {
                timeout,
                all,
                output,
            } => {
                assert_eq!(timeout, 10);
                assert!(!all);
                assert_eq!(output.format, OutputFormat::Text);
            }
            _ => panic!("expected discover"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["flow", "battery", "-v", "--device", "X"]).unwrap();
        assert!(cli.verbose);
        assert!(!cli.quiet);
    }
}
