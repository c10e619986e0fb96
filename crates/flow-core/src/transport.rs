//! Transport abstraction.
//!
//! A [`Session`](crate::Session) never talks to a BLE stack directly. It
//! drives a [`Transport`], which opens [`Link`]s: one live GATT connection
//! each. [`BleTransport`](crate::ble::BleTransport) implements this over
//! btleplug and [`MockTransport`](crate::mock::MockTransport) implements it in
//! memory for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::WriteType;
use uuid::Uuid;

use crate::error::Result;

/// Callback invoked with the raw payload of every notification on a
/// subscribed characteristic, in the order the transport delivers them.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Something that can open connections to a device address.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use flow_core::{Link, Transport};
///
/// async fn battery<T: Transport>(transport: &T) -> flow_core::Result<Vec<u8>> {
///     let link = transport.connect("E4:3D:7F:05:7C:FA", Duration::from_secs(20)).await?;
///     let data = link.read(flow_types::uuid::BATTERY_LEVEL).await;
///     link.disconnect().await?;
///     data
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// The connection type this transport produces.
    type Link: Link + 'static;

    /// Open a connection to `address`, giving up after `timeout`.
    async fn connect(&self, address: &str, timeout: Duration) -> Result<Self::Link>;
}

/// One open GATT connection.
#[async_trait]
pub trait Link: Send + Sync {
    /// Whether the underlying connection is still up.
    async fn is_connected(&self) -> bool;

    /// Read a characteristic value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value.
    ///
    /// With [`WriteType::WithResponse`] the call completes once the device
    /// has acknowledged the write, so rejections surface here.
    async fn write(&self, characteristic: Uuid, data: &[u8], write_type: WriteType) -> Result<()>;

    /// Subscribe to notifications, routing each payload to `handler`.
    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<()>;

    /// Stop notifications on a characteristic.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;
}
