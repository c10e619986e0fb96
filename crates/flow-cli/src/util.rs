//! Shared helpers for command implementations.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use flow_core::{BleTransport, Session};

use crate::cli::DeviceArgs;
use crate::config::{Config, resolve_device};

/// Get device identifier or return an error with a helpful message.
pub fn require_device(device: Option<String>) -> Result<String> {
    device.ok_or_else(|| {
        anyhow::anyhow!(
            "No device specified. Use --device <ADDRESS> or set FLOW_DEVICE environment variable.\n\
             Run 'flow discover' to find nearby devices."
        )
    })
}

/// Resolve the target device and open an authenticated session to it.
pub async fn open_session(
    args: &DeviceArgs,
    config: &Config,
    quiet: bool,
) -> Result<Session<BleTransport>> {
    let address = require_device(resolve_device(args.device.clone(), config))?;
    let session_config = config.session_config(args.timeout)?;

    if !quiet {
        eprintln!("Connecting to {}...", address);
    }

    let mut session = Session::with_config(BleTransport::new(), address.as_str(), session_config)?;
    session
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;
    Ok(session)
}

/// Write output to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_device_with_some() {
        let result = require_device(Some("AA:BB:CC:DD:EE:FF".to_string()));
        assert_eq!(result.unwrap(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_require_device_with_none() {
        let err = require_device(None).unwrap_err();
        assert!(err.to_string().contains("FLOW_DEVICE"));
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
