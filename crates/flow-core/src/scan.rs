//! Device discovery and scanning.
//!
//! Flow 2 units advertise with a local name containing `FLOW`. Discovery runs
//! a timed scan and reports every peripheral whose name matches.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{DeviceNotFoundReason, Error, Result};

/// Default scan duration for discovery.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Substring (case-insensitive) identifying a Flow device by its advertised name.
pub const FLOW_NAME_MARKER: &str = "flow";

/// Address reported by platforms (macOS) that hide the real MAC.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// A device seen during a scan.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Advertised local name.
    pub name: Option<String>,
    /// Platform peripheral id.
    #[serde(skip)]
    pub id: PeripheralId,
    /// BLE address (all zeros on macOS).
    pub address: String,
    /// Identifier to connect with: the address, or the peripheral id where
    /// the address is hidden.
    pub identifier: String,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan.
    pub duration: Duration,
    /// Only report devices whose name marks them as a Flow.
    pub filter_flow_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SCAN_DURATION,
            filter_flow_only: true,
        }
    }
}

impl ScanOptions {
    /// Create scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set whether to report Flow devices only.
    #[must_use]
    pub fn filter_flow_only(mut self, filter: bool) -> Self {
        self.filter_flow_only = filter;
        self
    }

    /// Report every BLE device seen.
    #[must_use]
    pub fn all_devices(self) -> Self {
        self.filter_flow_only(false)
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Scan for Flow devices in range.
///
/// An empty list means nothing was found; it is not an error.
pub async fn discover(options: ScanOptions) -> Result<Vec<DiscoveredDevice>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, options).await
}

/// Scan using a specific adapter.
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: ScanOptions,
) -> Result<Vec<DiscoveredDevice>> {
    info!(duration = ?options.duration, "Starting BLE scan");

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let mut discovered = Vec::new();
    for peripheral in adapter.peripherals().await? {
        match process_peripheral(&peripheral, options.filter_flow_only).await {
            Ok(Some(device)) => {
                info!(name = ?device.name, identifier = %device.identifier, "Found device");
                discovered.push(device);
            }
            Ok(None) => {}
            Err(e) => debug!("Error processing peripheral: {}", e),
        }
    }

    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

async fn process_peripheral(
    peripheral: &Peripheral,
    filter_flow_only: bool,
) -> Result<Option<DiscoveredDevice>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    if filter_flow_only && !is_flow_device(&properties) {
        return Ok(None);
    }

    let id = peripheral.id();
    let address = properties.address.to_string();
    let identifier = create_identifier(&address, &id);

    Ok(Some(DiscoveredDevice {
        name: properties.local_name,
        id,
        address,
        identifier,
        rssi: properties.rssi,
    }))
}

fn is_flow_device(properties: &PeripheralProperties) -> bool {
    properties.local_name.as_deref().is_some_and(is_flow_name)
}

/// Whether an advertised name identifies a Flow device.
pub fn is_flow_name(name: &str) -> bool {
    name.to_lowercase().contains(FLOW_NAME_MARKER)
}

/// Find a device by address, peripheral id or name.
///
/// Known peripherals are checked first; otherwise up to three scans of
/// increasing length are run within `budget`.
pub async fn find_device(identifier: &str, budget: Duration) -> Result<(Adapter, Peripheral)> {
    let adapter = get_adapter().await?;
    let identifier_lower = identifier.to_lowercase();

    debug!("Looking for device: {}", identifier);

    if let Some(peripheral) = find_peripheral_by_identifier(&adapter, &identifier_lower).await? {
        debug!("Found device among known peripherals");
        return Ok((adapter, peripheral));
    }

    const MAX_ATTEMPTS: u32 = 3;

    for attempt in 1..=MAX_ATTEMPTS {
        let scan_duration = attempt_duration(budget, attempt);
        debug!(attempt, ?scan_duration, "Scanning for device");

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(scan_duration).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) =
            find_peripheral_by_identifier(&adapter, &identifier_lower).await?
        {
            debug!("Found device on attempt {}", attempt);
            return Ok((adapter, peripheral));
        }
    }

    warn!(
        "Device not found after {} attempts: {}",
        MAX_ATTEMPTS, identifier
    );
    Err(Error::device_not_found(identifier))
}

async fn find_peripheral_by_identifier(
    adapter: &Adapter,
    identifier_lower: &str,
) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };

        let peripheral_id = format_peripheral_id(&peripheral.id()).to_lowercase();
        if peripheral_id == identifier_lower {
            debug!("Matched by peripheral ID: {}", peripheral_id);
            return Ok(Some(peripheral));
        }

        let address = props.address.to_string().to_lowercase();
        if address != HIDDEN_ADDRESS && addresses_match(&address, identifier_lower) {
            debug!("Matched by address: {}", address);
            return Ok(Some(peripheral));
        }

        if let Some(name) = &props.local_name
            && name.to_lowercase().contains(identifier_lower)
        {
            debug!("Matched by name: {}", name);
            return Ok(Some(peripheral));
        }
    }

    Ok(None)
}

/// Scan length for `attempt` (1-based). The three attempts take 1, 2 and 3
/// sixths of `budget`, so together they never exceed it.
fn attempt_duration(budget: Duration, attempt: u32) -> Duration {
    budget / 6 * attempt
}

fn addresses_match(a: &str, b: &str) -> bool {
    a.replace([':', '-'], "").eq_ignore_ascii_case(&b.replace([':', '-'], ""))
}

/// Format a peripheral id as a bare string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    strip_peripheral_id(&format!("{:?}", id)).to_string()
}

fn strip_peripheral_id(debug: &str) -> &str {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
}

/// Identifier to connect with: the address unless the platform hides it.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == HIDDEN_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_flow_name() {
        assert!(is_flow_name("FLOW-00:43:A6"));
        assert!(is_flow_name("Flow 2"));
        assert!(is_flow_name("my flow sensor"));
        assert!(!is_flow_name("LYWSD03MMC"));
        assert!(!is_flow_name(""));
    }

    #[test]
    fn test_scan_options() {
        let options = ScanOptions::default();
        assert_eq!(options.duration, Duration::from_secs(10));
        assert!(options.filter_flow_only);

        let options = ScanOptions::new()
            .duration(Duration::from_secs(3))
            .all_devices();
        assert_eq!(options.duration, Duration::from_secs(3));
        assert!(!options.filter_flow_only);
    }

    #[test]
    fn test_scan_attempts_stay_within_budget() {
        let budget = Duration::from_secs(10);
        let total: Duration = (1..=3).map(|a| attempt_duration(budget, a)).sum();
        assert!(total <= budget);
        assert!(attempt_duration(budget, 1) < attempt_duration(budget, 3));
    }

    #[test]
    fn test_addresses_match() {
        assert!(addresses_match("e4:3d:7f:05:7c:fa", "e4:3d:7f:05:7c:fa"));
        assert!(addresses_match("e4:3d:7f:05:7c:fa", "e43d7f057cfa"));
        assert!(addresses_match("e4:3d:7f:05:7c:fa", "E4-3D-7F-05-7C-FA"));
        assert!(!addresses_match("e4:3d:7f:05:7c:fa", "e4:3d:7f:05:7c:fb"));
    }

    #[test]
    fn test_strip_peripheral_id() {
        assert_eq!(
            strip_peripheral_id("PeripheralId(hci0/dev_E4_3D_7F_05_7C_FA)"),
            "hci0/dev_E4_3D_7F_05_7C_FA"
        );
        assert_eq!(strip_peripheral_id("plain"), "plain");
    }
}
