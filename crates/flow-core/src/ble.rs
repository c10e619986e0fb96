//! btleplug-backed transport.
//!
//! [`BleTransport`] finds a peripheral by address, id or name, connects,
//! discovers its services and hands back a [`BleLink`]. Every GATT operation
//! on the link is bounded by a timeout from [`ConnectionConfig`].

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::scan::{create_identifier, find_device, format_peripheral_id};
use crate::transport::{Link, NotificationHandler, Transport};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts for individual GATT operations.
///
/// The overall connect budget comes from
/// [`SessionConfig::connection_timeout`](crate::SessionConfig::connection_timeout).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use flow_core::ble::ConnectionConfig;
///
/// let config = ConnectionConfig::challenging_environment()
///     .read_timeout(Duration::from_secs(20));
/// assert_eq!(config.read_timeout, Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for characteristic reads.
    pub read_timeout: Duration,
    /// Timeout for characteristic writes.
    pub write_timeout: Duration,
    /// Timeout for service discovery after connecting.
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Longer timeouts for noisy RF environments or distant devices.
    pub fn challenging_environment() -> Self {
        Self {
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(15),
        }
    }

    /// Short timeouts for quick failure detection with a nearby device.
    pub fn fast() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(5),
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

/// Transport over the host's first Bluetooth adapter.
#[derive(Debug, Clone, Default)]
pub struct BleTransport {
    config: ConnectionConfig,
}

impl BleTransport {
    /// Create a transport with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport with custom timeouts.
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Active timeouts.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for BleTransport {
    type Link = BleLink;

    async fn connect(&self, address: &str, budget: Duration) -> Result<BleLink> {
        let deadline = Instant::now() + budget;
        let (adapter, peripheral) = find_device(address, scan_budget(budget)).await?;
        BleLink::open(adapter, peripheral, deadline, self.config.clone()).await
    }
}

/// One open connection to a peripheral.
pub struct BleLink {
    // Held so the adapter outlives the peripheral connection.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    address: String,
    characteristics: HashMap<Uuid, Characteristic>,
    service_count: usize,
    pumps: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    config: ConnectionConfig,
}

impl std::fmt::Debug for BleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleLink")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("characteristics", &self.characteristics.len())
            .finish_non_exhaustive()
    }
}

impl BleLink {
    /// Connect and discover services before `deadline`.
    ///
    /// A failure after the connect attempt closes the peripheral again.
    #[tracing::instrument(level = "debug", skip_all)]
    async fn open(
        adapter: Adapter,
        peripheral: Peripheral,
        deadline: Instant,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let address = format_peripheral_id(&peripheral.id());
        let mut link = Self {
            adapter,
            peripheral,
            name: None,
            address,
            characteristics: HashMap::new(),
            service_count: 0,
            pumps: Mutex::new(HashMap::new()),
            config,
        };

        let result = link.establish(deadline).await;
        close_on_error(result, link.peripheral.disconnect()).await?;
        Ok(link)
    }

    async fn establish(&mut self, deadline: Instant) -> Result<()> {
        let connect_timeout = remaining(deadline);
        bounded(connect_timeout, "connect to device", self.peripheral.connect()).await?;
        info!("Connected");

        let discovery_timeout = self.config.discovery_timeout.min(remaining(deadline));
        let discover = self.peripheral.discover_services();
        bounded(discovery_timeout, "discover services", discover).await?;

        let services = self.peripheral.services();
        for service in &services {
            debug!("  Service: {}", service.uuid);
            for characteristic in &service.characteristics {
                debug!("    Characteristic: {}", characteristic.uuid);
                self.characteristics.insert(characteristic.uuid, characteristic.clone());
            }
        }
        self.service_count = services.len();

        if let Some(properties) = self.peripheral.properties().await? {
            let address = properties.address.to_string();
            self.address = create_identifier(&address, &self.peripheral.id());
            self.name = properties.local_name;
        }
        Ok(())
    }

    /// Advertised name of the peripheral.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Address (or peripheral id where the platform hides addresses).
    pub fn address(&self) -> &str {
        &self.address
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .get(&uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid.to_string(), self.service_count))
    }
}

#[async_trait]
impl Link for BleLink {
    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn read(&self, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(uuid)?;
        bounded(
            self.config.read_timeout,
            format!("read characteristic {}", uuid),
            self.peripheral.read(characteristic),
        )
        .await
    }

    async fn write(&self, uuid: Uuid, data: &[u8], write_type: WriteType) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;
        bounded(
            self.config.write_timeout,
            format!("write characteristic {}", uuid),
            self.peripheral.write(characteristic, data, write_type),
        )
        .await
    }

    async fn subscribe(&self, uuid: Uuid, handler: NotificationHandler) -> Result<()> {
        let characteristic = self.characteristic(uuid)?;
        self.peripheral.subscribe(characteristic).await?;

        let notifications = self.peripheral.notifications().await.map_err(Error::from);
        let unsubscribe = self.peripheral.unsubscribe(characteristic);
        let mut stream = close_on_error(notifications, unsubscribe).await?;
        let pump = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == uuid {
                    handler(&notification.value);
                }
            }
            debug!(%uuid, "Notification stream ended");
        });

        if let Some(previous) = self.pumps.lock().await.insert(uuid, pump) {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self, uuid: Uuid) -> Result<()> {
        if let Some(pump) = self.pumps.lock().await.remove(&uuid) {
            pump.abort();
        }
        let characteristic = self.characteristic(uuid)?;
        self.peripheral.unsubscribe(characteristic).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        for (_, pump) in self.pumps.lock().await.drain() {
            pump.abort();
        }
        self.peripheral.disconnect().await?;
        info!(address = %self.address, "Disconnected");
        Ok(())
    }
}

impl Drop for BleLink {
    fn drop(&mut self) {
        match self.pumps.try_lock() {
            Ok(mut pumps) => {
                for (_, pump) in pumps.drain() {
                    pump.abort();
                }
            }
            Err(_) => warn!("Could not abort notification tasks on drop"),
        }
    }
}

async fn bounded<T, F>(limit: Duration, operation: impl Into<String>, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, btleplug::Error>>,
{
    match timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::timeout(operation, limit)),
    }
}

/// Share of the connect budget spent looking for the peripheral. The rest
/// is left for connecting and service discovery.
fn scan_budget(budget: Duration) -> Duration {
    budget / 2
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Run `close` if `result` is an error. A failure to close is logged and
/// the original error returned.
async fn close_on_error<T, C>(result: Result<T>, close: C) -> Result<T>
where
    C: Future<Output = std::result::Result<(), btleplug::Error>>,
{
    if result.is_err()
        && let Err(e) = close.await
    {
        debug!(error = %e, "Error closing after failure");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[test]
    fn test_connection_config_presets() {
        let default = ConnectionConfig::default();
        assert_eq!(default.read_timeout, Duration::from_secs(10));

        let fast = ConnectionConfig::fast();
        let slow = ConnectionConfig::challenging_environment();
        assert!(fast.read_timeout < default.read_timeout);
        assert!(slow.discovery_timeout > default.discovery_timeout);
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::new()
            .read_timeout(Duration::from_secs(1))
            .write_timeout(Duration::from_secs(2))
            .discovery_timeout(Duration::from_secs(3));
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.write_timeout, Duration::from_secs(2));
        assert_eq!(config.discovery_timeout, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(
            Duration::from_secs(1),
            "stall",
            futures::future::pending::<std::result::Result<(), btleplug::Error>>(),
        )
        .await;
        assert!(
            matches!(result, Err(Error::Timeout { ref operation, .. }) if operation == "stall")
        );
    }

    #[tokio::test]
    async fn test_bounded_maps_ble_errors() {
        let result: Result<()> = bounded(Duration::from_secs(1), "write", async {
            Err(btleplug::Error::NotConnected)
        })
        .await;
        assert!(matches!(
            result,
            Err(Error::Bluetooth(btleplug::Error::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_failure_after_connect_closes_peripheral() {
        let closed = AtomicBool::new(false);
        let failed: Result<()> = Err(Error::timeout("discover services", Duration::from_secs(10)));

        let result = close_on_error(failed, async {
            closed.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_success_leaves_peripheral_open() {
        let closed = AtomicBool::new(false);

        let result = close_on_error(Ok(7), async {
            closed.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert!(!closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_failure_keeps_original_error() {
        let failed: Result<()> = Err(Error::NotConnected);
        let result = close_on_error(failed, async { Err(btleplug::Error::NotConnected) }).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_shares_one_deadline() {
        let budget = Duration::from_secs(20);
        let deadline = Instant::now() + budget;
        assert_eq!(scan_budget(budget), Duration::from_secs(10));

        tokio::time::sleep(scan_budget(budget)).await;
        assert_eq!(remaining(deadline), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(remaining(deadline), Duration::ZERO);
    }
}
