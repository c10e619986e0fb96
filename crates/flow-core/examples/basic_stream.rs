//! Example: Streaming Live Readings
//!
//! Connects to a Flow 2, prints live PM2.5 readings for 30 seconds and
//! disconnects.
//!
//! Run with: `cargo run --example basic_stream -- <DEVICE_ADDRESS>`

use std::env;
use std::time::Duration;

use flow_core::{BleTransport, Notification, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(address) = args.get(1) else {
        eprintln!("Usage: {} <DEVICE_ADDRESS>", args[0]);
        std::process::exit(1);
    };

    let mut session = Session::new(BleTransport::new(), address.as_str());
    println!("Connecting to {}...", address);
    session.connect().await?;

    if let Some(level) = session.read_battery().await? {
        println!("Battery: {}%", level);
    }

    session
        .start_stream(|notification| {
            if let Notification::Live(pm25) = notification {
                println!("PM2.5: {:.2} µg/m³", pm25);
            }
        })
        .await?;

    tokio::time::sleep(Duration::from_secs(30)).await;
    session.disconnect().await;
    Ok(())
}
