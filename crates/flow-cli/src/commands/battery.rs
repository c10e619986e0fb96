//! Battery command implementation.

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::Config;
use crate::format::{format_battery_json, format_battery_text};
use crate::util::{open_session, write_output};

pub async fn cmd_battery(
    device: &DeviceArgs,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let mut session = open_session(device, config, quiet).await?;
    let level = session.read_battery().await;
    session.disconnect().await;

    let level = level?;
    let content = match format {
        OutputFormat::Text => format_battery_text(level),
        OutputFormat::Json => format_battery_json(level)?,
    };
    write_output(output, &content)
}
