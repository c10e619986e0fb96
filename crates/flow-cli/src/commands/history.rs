//! History command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use super::read::{StreamPrinter, stream};
use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::Config;
use crate::util::open_session;

pub async fn cmd_history(
    device: &DeviceArgs,
    wait: u64,
    preview: usize,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let mut session = open_session(device, config, quiet).await?;
    if !quiet {
        eprintln!("Requesting history, waiting {} seconds...", wait);
    }

    let result = stream(
        &mut session,
        Duration::from_secs(wait),
        StreamPrinter::new(format, output, preview),
        true,
    )
    .await;
    session.disconnect().await;
    result
}
