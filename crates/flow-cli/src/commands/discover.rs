//! Discover command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use flow_core::{ScanOptions, scan};

use crate::cli::OutputFormat;
use crate::format::{format_devices_json, format_devices_text};
use crate::util::write_output;

pub async fn cmd_discover(
    timeout: u64,
    all: bool,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
) -> Result<()> {
    if !quiet && format == OutputFormat::Text {
        eprintln!("Scanning for {} seconds...", timeout);
    }

    let options = ScanOptions::default()
        .duration(Duration::from_secs(timeout))
        .filter_flow_only(!all);

    let devices = scan::discover(options)
        .await
        .context("Failed to scan for devices")?;

    let content = match format {
        OutputFormat::Text => format_devices_text(&devices),
        OutputFormat::Json => format_devices_json(&devices)?,
    };
    write_output(output, &content)
}
