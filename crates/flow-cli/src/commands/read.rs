//! Read command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use flow_core::{BleTransport, Session};
use flow_types::Notification;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval, sleep_until};

use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::Config;
use crate::format::{format_notification_json, format_notification_text};
use crate::util::{open_session, write_output};

pub async fn cmd_read(
    device: &DeviceArgs,
    duration: u64,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let mut session = open_session(device, config, quiet).await?;
    if !quiet {
        eprintln!("Streaming for {} seconds (Ctrl+C to stop)...", duration);
    }

    let result = stream(
        &mut session,
        Duration::from_secs(duration),
        StreamPrinter::new(format, output, 0),
        false,
    )
    .await;
    session.disconnect().await;
    result
}

/// Renders notifications, either straight to stdout or buffered for a file.
pub(super) struct StreamPrinter<'a> {
    format: OutputFormat,
    output: Option<&'a PathBuf>,
    preview: usize,
    buffer: String,
    count: usize,
}

impl<'a> StreamPrinter<'a> {
    pub(super) fn new(format: OutputFormat, output: Option<&'a PathBuf>, preview: usize) -> Self {
        Self {
            format,
            output,
            preview,
            buffer: String::new(),
            count: 0,
        }
    }

    fn print(&mut self, notification: &Notification) -> Result<()> {
        let line = match self.format {
            OutputFormat::Text => format_notification_text(notification, self.preview),
            OutputFormat::Json => format_notification_json(notification)?,
        };
        self.count += 1;
        match self.output {
            Some(_) => {
                self.buffer.push_str(&line);
                Ok(())
            }
            None => write_output(None, &line),
        }
    }

    fn finish(self) -> Result<usize> {
        if self.output.is_some() {
            write_output(self.output, &self.buffer)?;
        }
        Ok(self.count)
    }
}

/// Start streaming, optionally request history, then print notifications
/// until `duration` elapses, Ctrl+C is pressed or the keep-alive gives up.
pub(super) async fn stream(
    session: &mut Session<BleTransport>,
    duration: Duration,
    mut printer: StreamPrinter<'_>,
    request_history: bool,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    session
        .start_stream(move |notification| {
            let _ = tx.send(notification);
        })
        .await
        .context("Failed to start streaming")?;
    if request_history {
        session
            .fetch_history()
            .await
            .context("Failed to request history")?;
    }

    let deadline = sleep_until(Instant::now() + duration);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);
    let mut health = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            Some(notification) = rx.recv() => printer.print(&notification)?,
            _ = &mut deadline => break,
            _ = &mut interrupted => {
                tracing::info!("Interrupted");
                break;
            }
            _ = health.tick() => {
                if !session.is_streaming() {
                    tracing::warn!("Keep-alive failed, device stopped streaming");
                    break;
                }
            }
        }
    }

    let count = printer.finish()?;
    tracing::debug!(count, "Stream finished");
    Ok(())
}
