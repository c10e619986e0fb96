//! Output formatting for CLI commands.

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use flow_core::DiscoveredDevice;
use flow_types::{HistoryBlock, Notification};

/// A history block as shown to users.
#[derive(Debug, Serialize)]
pub struct HistoryRow {
    /// Decoded block timestamp, if it decodes.
    pub timestamp: Option<String>,
    /// Block length in bytes.
    pub len: usize,
    /// Full block as hex.
    pub hex: String,
}

impl HistoryRow {
    pub fn from_block(block: &HistoryBlock) -> Self {
        Self {
            timestamp: block.timestamp().ok().and_then(format_time),
            len: block.len(),
            hex: hex::encode(block.as_bytes()),
        }
    }
}

/// A live reading as shown to users.
#[derive(Debug, Serialize)]
pub struct LiveRow {
    /// Local receive time.
    pub received: Option<String>,
    /// PM2.5 in µg/m³.
    pub pm25: f32,
}

fn format_time(at: OffsetDateTime) -> Option<String> {
    at.format(&Rfc3339).ok()
}

/// Current time as RFC 3339, for stamping received readings.
pub fn now() -> Option<String> {
    format_time(OffsetDateTime::now_utc())
}

pub fn format_devices_text(devices: &[DiscoveredDevice]) -> String {
    if devices.is_empty() {
        return "No Flow devices found.\n".to_string();
    }

    let mut out = format!("Found {} device(s):\n\n", devices.len());
    out.push_str(&format!("{:<24} {:<40} {:>8}\n", "NAME", "IDENTIFIER", "RSSI"));
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<24} {:<40} {:>8}\n",
            device.name.as_deref().unwrap_or("Unknown"),
            device.identifier,
            rssi
        ));
    }
    out
}

pub fn format_devices_json(devices: &[DiscoveredDevice]) -> Result<String> {
    Ok(serde_json::to_string_pretty(devices)? + "\n")
}

pub fn format_battery_text(level: Option<u8>) -> String {
    match level {
        Some(level) => format!("Battery: {}%\n", level),
        None => "Battery: unavailable\n".to_string(),
    }
}

pub fn format_battery_json(level: Option<u8>) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({ "battery": level }))? + "\n")
}

/// One line per notification in text mode.
pub fn format_notification_text(notification: &Notification, preview: usize) -> String {
    match notification {
        Notification::Live(pm25) => format!("PM2.5: {:>7.2} µg/m³\n", pm25),
        Notification::History(block) => {
            let when = block
                .timestamp()
                .ok()
                .and_then(format_time)
                .unwrap_or_else(|| "?".to_string());
            format!(
                "{}  {:>4} bytes  {}\n",
                when,
                block.len(),
                block.header_hex(preview)
            )
        }
    }
}

/// One JSON object per line (JSON Lines) per notification.
pub fn format_notification_json(notification: &Notification) -> Result<String> {
    let line = match notification {
        Notification::Live(pm25) => {
            let row = LiveRow {
                received: now(),
                pm25: *pm25,
            };
            serde_json::to_string(&serde_json::json!({ "kind": "live", "value": row }))?
        }
        Notification::History(block) => {
            let row = HistoryRow::from_block(block);
            serde_json::to_string(&serde_json::json!({ "kind": "history", "value": row }))?
        }
    };
    Ok(line + "\n")
}
