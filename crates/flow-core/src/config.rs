//! Session configuration.
//!
//! [`SessionConfig`] holds the timing policy of a [`Session`](crate::Session)
//! and the [`ProtocolConfig`] describing which characteristics and command
//! bytes to use.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use flow_core::SessionConfig;
//!
//! let config = SessionConfig::default()
//!     .connection_timeout(Duration::from_secs(30))
//!     .keep_alive_interval(Duration::from_secs(4));
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use uuid::Uuid;

use flow_types::uuid::{AUTH, BATTERY_LEVEL, COMMAND, DATA};

use crate::commands::{ACTIVATE, AUTH_KEY, FETCH_HISTORY};
use crate::error::{Error, Result};

/// Default budget for establishing a BLE connection.
///
/// BLE handshakes are slow and vary a lot between stacks, so this is generous.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Interval between keep-alive pulses while streaming.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Characteristic ids and command bytes of the Flow 2 protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Characteristic the authentication key is written to.
    pub auth_characteristic: Uuid,
    /// Characteristic commands are written to.
    pub command_characteristic: Uuid,
    /// Characteristic that notifies live readings and history blocks.
    pub data_characteristic: Uuid,
    /// Battery level characteristic.
    pub battery_characteristic: Uuid,
    /// Authentication key bytes.
    pub auth_key: Vec<u8>,
    /// Activation command bytes (also used as the keep-alive pulse).
    pub activate_command: Vec<u8>,
    /// Fetch-history command bytes.
    pub fetch_history_command: Vec<u8>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            auth_characteristic: AUTH,
            command_characteristic: COMMAND,
            data_characteristic: DATA,
            battery_characteristic: BATTERY_LEVEL,
            auth_key: AUTH_KEY.to_vec(),
            activate_command: ACTIVATE.to_vec(),
            fetch_history_command: FETCH_HISTORY.to_vec(),
        }
    }
}

impl ProtocolConfig {
    /// Set the authentication key.
    #[must_use]
    pub fn auth_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.auth_key = key.into();
        self
    }

    /// Set the activation command.
    #[must_use]
    pub fn activate_command(mut self, command: impl Into<Vec<u8>>) -> Self {
        self.activate_command = command.into();
        self
    }

    /// Set the fetch-history command.
    #[must_use]
    pub fn fetch_history_command(mut self, command: impl Into<Vec<u8>>) -> Self {
        self.fetch_history_command = command.into();
        self
    }

    /// Validate the protocol description.
    ///
    /// Checks that:
    /// - no command payload is empty
    /// - commands and notifications do not share a characteristic
    pub fn validate(&self) -> Result<()> {
        if self.auth_key.is_empty() {
            return Err(Error::invalid_config("auth_key must not be empty"));
        }
        if self.activate_command.is_empty() {
            return Err(Error::invalid_config("activate_command must not be empty"));
        }
        if self.fetch_history_command.is_empty() {
            return Err(Error::invalid_config(
                "fetch_history_command must not be empty",
            ));
        }
        if self.command_characteristic == self.data_characteristic {
            return Err(Error::invalid_config(
                "command and data characteristics must differ",
            ));
        }
        Ok(())
    }
}

/// Timing policy and protocol description for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Budget for the transport connect.
    pub connection_timeout: Duration,
    /// Interval between keep-alive pulses.
    pub keep_alive_interval: Duration,
    /// Characteristics and command bytes.
    pub protocol: ProtocolConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            protocol: ProtocolConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create a new session config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the keep-alive interval.
    #[must_use]
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Replace the protocol description.
    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    /// Validate the config and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.connection_timeout.is_zero() {
            return Err(Error::invalid_config("connection_timeout must be > 0"));
        }
        if self.keep_alive_interval.is_zero() {
            return Err(Error::invalid_config("keep_alive_interval must be > 0"));
        }
        self.protocol.validate()
    }
}
