//! Flow 2 session state machine.
//!
//! A [`Session`] owns at most one [`Link`] to a Flow 2 and walks it through
//! [`SessionState::Disconnected`] → [`SessionState::Connecting`] →
//! [`SessionState::Authenticated`] ⇄ [`SessionState::Streaming`].
//!
//! # Example
//!
//! ```ignore
//! use flow_core::{BleTransport, Session};
//!
//! #[tokio::main]
//! async fn main() -> flow_core::Result<()> {
//!     let mut session = Session::new(BleTransport::default(), "E4:3D:7F:05:7C:FA");
//!     session.connect().await?;
//!     session.start_stream(|n| println!("{n}")).await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use btleplug::api::WriteType;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use flow_types::Notification;

use crate::config::SessionConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::keepalive::{KeepAlive, Pulse};
use crate::transport::{Link, NotificationHandler, Transport};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No link.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected and authenticated, not streaming.
    Authenticated,
    /// Notifications subscribed and keep-alive running.
    Streaming,
}

impl SessionState {
    /// Whether the session holds an authenticated link.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Authenticated | Self::Streaming)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticated => "authenticated",
            Self::Streaming => "streaming",
        };
        f.write_str(s)
    }
}

/// A session with one Flow 2 device.
///
/// Operations that change state take `&mut self`, so a session is driven by
/// one task at a time. Decoded notifications reach the observer passed to
/// [`start_stream`](Self::start_stream) on whatever task the transport
/// delivers them from.
pub struct Session<T: Transport> {
    transport: T,
    address: String,
    config: SessionConfig,
    state: SessionState,
    link: Option<Arc<T::Link>>,
    streaming: Arc<AtomicBool>,
    keep_alive: Option<KeepAlive>,
    dispatcher: Dispatcher,
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("state", &self.state)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Session<T> {
    /// Create a disconnected session with the default configuration.
    pub fn new(transport: T, address: impl Into<String>) -> Self {
        Self::build(transport, address.into(), SessionConfig::default())
    }

    /// Create a disconnected session with a custom configuration.
    ///
    /// Fails with [`Error::InvalidConfig`] if `config` does not validate.
    pub fn with_config(
        transport: T,
        address: impl Into<String>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, address.into(), config))
    }

    fn build(transport: T, address: String, config: SessionConfig) -> Self {
        Self {
            transport,
            address,
            config,
            state: SessionState::Disconnected,
            link: None,
            streaming: Arc::new(AtomicBool::new(false)),
            keep_alive: None,
            dispatcher: Dispatcher::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the keep-alive is still pulsing.
    ///
    /// This can turn false while [`state`](Self::state) is still
    /// [`SessionState::Streaming`] if a keep-alive write failed.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Device address this session targets.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Active configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect to the device and authenticate.
    ///
    /// On failure the half-open link is closed and the session is back in
    /// [`SessionState::Disconnected`].
    #[tracing::instrument(skip(self), fields(address = %self.address))]
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(Error::AlreadyConnected);
        }

        self.state = SessionState::Connecting;
        info!("Connecting");

        let link = match self
            .transport
            .connect(&self.address, self.config.connection_timeout)
            .await
        {
            Ok(link) => link,
            Err(e) => {
                self.state = SessionState::Disconnected;
                warn!(error = %e, "Connect failed");
                return Err(e.into_connect_failure(&self.address));
            }
        };

        let protocol = &self.config.protocol;
        if let Err(e) = link
            .write(
                protocol.auth_characteristic,
                &protocol.auth_key,
                WriteType::WithResponse,
            )
            .await
        {
            warn!(error = %e, "Authentication write failed");
            if let Err(close_err) = link.disconnect().await {
                debug!(error = %close_err, "Error closing half-open link");
            }
            self.state = SessionState::Disconnected;
            return Err(e.into_connect_failure(&self.address));
        }

        self.link = Some(Arc::new(link));
        self.state = SessionState::Authenticated;
        info!("Authenticated");
        Ok(())
    }

    /// Read the battery level in percent.
    ///
    /// Returns `Ok(None)` when the read fails or the device returns no data.
    #[tracing::instrument(skip(self), fields(address = %self.address))]
    pub async fn read_battery(&self) -> Result<Option<u8>> {
        let link = self.connected_link().await?;

        match link.read(self.config.protocol.battery_characteristic).await {
            Ok(data) => match data.first() {
                Some(&level) => {
                    debug!(level, "Battery level");
                    Ok(Some(level))
                }
                None => {
                    warn!("Battery read returned no data");
                    Ok(None)
                }
            },
            Err(e) => {
                warn!(error = %e, "Battery read failed");
                Ok(None)
            }
        }
    }

    /// Subscribe to notifications, activate the stream and start the
    /// keep-alive.
    ///
    /// `observer` replaces any previously registered observer. Calling this
    /// while already streaming is a no-op apart from that replacement. If the
    /// keep-alive has stopped on its own, the stream is torn down and started
    /// again.
    #[tracing::instrument(skip(self, observer), fields(address = %self.address))]
    pub async fn start_stream<F>(&mut self, observer: F) -> Result<SessionState>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        if self.state == SessionState::Streaming {
            if self.is_streaming() {
                self.dispatcher.set_observer(observer);
                debug!("Already streaming");
                return Ok(self.state);
            }
            info!("Keep-alive has stopped, restarting stream");
            self.stop_stream().await;
        }

        let link = self.connected_link().await?;
        let protocol = self.config.protocol.clone();

        self.dispatcher.set_observer(observer);
        let dispatcher = self.dispatcher.clone();
        let handler: NotificationHandler = Arc::new(move |payload| dispatcher.dispatch(payload));
        if let Err(e) = link.subscribe(protocol.data_characteristic, handler).await {
            warn!(error = %e, "Subscribe failed");
            if let Err(unsub_err) = link.unsubscribe(protocol.data_characteristic).await {
                debug!(error = %unsub_err, "Error unsubscribing after failed subscribe");
            }
            return Err(e);
        }

        if let Err(e) = link
            .write(
                protocol.command_characteristic,
                &protocol.activate_command,
                WriteType::WithResponse,
            )
            .await
        {
            warn!(error = %e, "Activation failed");
            if let Err(unsub_err) = link.unsubscribe(protocol.data_characteristic).await {
                debug!(error = %unsub_err, "Error unsubscribing after failed activation");
            }
            return Err(e);
        }

        self.streaming.store(true, Ordering::SeqCst);
        self.keep_alive = Some(KeepAlive::spawn(
            link,
            Arc::clone(&self.streaming),
            Pulse {
                characteristic: protocol.command_characteristic,
                payload: protocol.activate_command,
                interval: self.config.keep_alive_interval,
            },
        ));
        self.state = SessionState::Streaming;
        info!("Streaming started");
        Ok(self.state)
    }

    /// Ask the device to send its stored history.
    ///
    /// History blocks arrive through the stream observer, so this requires
    /// [`SessionState::Streaming`] with a live keep-alive.
    #[tracing::instrument(skip(self), fields(address = %self.address))]
    pub async fn fetch_history(&self) -> Result<()> {
        if self.state != SessionState::Streaming || !self.is_streaming() {
            return Err(Error::NotConnected);
        }
        let link = self.connected_link().await?;
        let protocol = &self.config.protocol;

        link.write(
            protocol.command_characteristic,
            &protocol.fetch_history_command,
            WriteType::WithResponse,
        )
        .await?;
        debug!("History requested");
        Ok(())
    }

    /// Stop streaming and return to [`SessionState::Authenticated`].
    ///
    /// Does nothing unless streaming. Unsubscribe failures are logged, not
    /// returned.
    #[tracing::instrument(skip(self), fields(address = %self.address))]
    pub async fn stop_stream(&mut self) {
        if self.state != SessionState::Streaming {
            return;
        }

        self.streaming.store(false, Ordering::SeqCst);
        if let Some(mut keep_alive) = self.keep_alive.take() {
            keep_alive.stop().await;
        }

        if let Some(link) = &self.link
            && let Err(e) = link
                .unsubscribe(self.config.protocol.data_characteristic)
                .await
        {
            warn!(error = %e, "Unsubscribe failed");
        }

        self.state = SessionState::Authenticated;
        info!("Streaming stopped");
    }

    /// Stop streaming and close the link.
    ///
    /// Always ends in [`SessionState::Disconnected`]; errors on the way are
    /// logged.
    #[tracing::instrument(skip(self), fields(address = %self.address))]
    pub async fn disconnect(&mut self) {
        self.stop_stream().await;

        if let Some(link) = self.link.take()
            && let Err(e) = link.disconnect().await
        {
            warn!(error = %e, "Disconnect failed");
        }

        self.state = SessionState::Disconnected;
        info!("Disconnected");
    }

    async fn connected_link(&self) -> Result<Arc<T::Link>> {
        if !self.state.is_connected() {
            return Err(Error::NotConnected);
        }
        let link = self.link.as_ref().ok_or(Error::NotConnected)?;
        if !link.is_connected().await {
            return Err(Error::NotConnected);
        }
        Ok(Arc::clone(link))
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        self.keep_alive = None;

        let Some(link) = self.link.take() else {
            return;
        };
        warn!(
            address = %self.address,
            "Session dropped while connected, closing link in the background"
        );

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = link.disconnect().await {
                    debug!(error = %e, "Background disconnect failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Disconnected.to_string(), "disconnected");
        assert_eq!(SessionState::Streaming.to_string(), "streaming");
    }

    #[test]
    fn test_state_is_connected() {
        assert!(!SessionState::Disconnected.is_connected());
        assert!(!SessionState::Connecting.is_connected());
        assert!(SessionState::Authenticated.is_connected());
        assert!(SessionState::Streaming.is_connected());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SessionState::Authenticated).unwrap();
        assert_eq!(json, "\"authenticated\"");
        let state: SessionState = serde_json::from_str("\"streaming\"").unwrap();
        assert_eq!(state, SessionState::Streaming);
    }

    #[test]
    fn test_default_state() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }
}
