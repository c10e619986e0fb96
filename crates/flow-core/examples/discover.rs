//! Example: Discovering Flow Devices
//!
//! Scans for nearby Flow devices and prints their identifiers.
//!
//! Run with: `cargo run --example discover -- [SECONDS]`

use std::env;
use std::time::Duration;

use flow_core::scan::{ScanOptions, discover};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let seconds = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    println!("Scanning for {} seconds...", seconds);
    let devices = discover(ScanOptions::default().duration(Duration::from_secs(seconds))).await?;

    if devices.is_empty() {
        println!("No Flow devices found.");
        return Ok(());
    }

    for device in devices {
        println!(
            "{:<20} {:<40} {}",
            device.name.as_deref().unwrap_or("Unknown"),
            device.identifier,
            device
                .rssi
                .map(|r| format!("{r} dBm"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
