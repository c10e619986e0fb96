//! Example: Fetching Stored History
//!
//! Requests the device's stored history and prints each block as it arrives.
//!
//! Run with: `cargo run --example fetch_history -- <DEVICE_ADDRESS>`

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
    session.connect().await?;
    session
        .start_stream(|notification| {
            if let Notification::History(block) = notification {
                match block.timestamp() {
                    Ok(at) => println!("{} {} bytes: {}", at, block.len(), block.header_hex(16)),
                    Err(_) => println!("{} bytes: {}", block.len(), block.header_hex(16)),
                }
            }
        })
        .await?;

    session.fetch_history().await?;
    tokio::time::sleep(Duration::from_secs(15)).await;
    session.disconnect().await;
    Ok(())
}
