//! Core BLE session driver for Flow 2 air quality monitors.
//!
//! A Flow 2 streams PM2.5 readings and stored history over GATT
//! notifications once it has been authenticated and activated, and stops
//! again unless it is pinged periodically. This crate wraps that protocol in
//! a [`Session`] state machine.
//!
//! # Features
//!
//! - **Discovery**: scan for nearby Flow devices ([`scan`])
//! - **Sessions**: connect, authenticate, stream, fetch history, disconnect
//! - **Keep-alive**: background task that keeps the stream open
//! - **Battery**: read the standard battery level characteristic
//! - **Testing**: [`MockTransport`] drives sessions without hardware
//!
//! # Platform Differences
//!
//! On macOS CoreBluetooth hides MAC addresses, so devices are identified by a
//! per-host UUID instead. [`DiscoveredDevice::identifier`] holds whichever
//! identifier the current platform can connect with.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use flow_core::{BleTransport, ScanOptions, Session, scan};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = scan::discover(ScanOptions::default()).await?;
//!     let Some(device) = devices.first() else {
//!         return Ok(());
//!     };
//!
//!     let mut session = Session::new(BleTransport::new(), device.identifier.clone());
//!     session.connect().await?;
//!     println!("Battery: {:?}", session.read_battery().await?);
//!
//!     session.start_stream(|n| println!("{n}")).await?;
//!     tokio::time::sleep(Duration::from_secs(30)).await;
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
mod keepalive;
pub mod mock;
pub mod scan;
pub mod session;
pub mod transport;

pub use ble::{BleLink, BleTransport, ConnectionConfig};
pub use config::{ProtocolConfig, SessionConfig};
pub use dispatch::{Dispatcher, Observer};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use mock::{MockLink, MockTransport, WriteRecord};
pub use scan::{DiscoveredDevice, ScanOptions};
pub use session::{Session, SessionState};
pub use transport::{Link, NotificationHandler, Transport};

pub use flow_types::uuid as uuids;
pub use flow_types::{DecodeError, HistoryBlock, Notification};
