//! Error types for flow-core.
//!
//! This module defines all error types that can occur when talking to a
//! Flow 2 monitor over Bluetooth Low Energy.
//!
//! # Propagation
//!
//! | Error | Raised by | Notes |
//! |-------|-----------|-------|
//! | [`Error::ConnectionFailed`] | `Session::connect` | Transport connect or handshake failed |
//! | [`Error::AuthenticationFailed`] | `Session::connect` | Device rejected the authentication key |
//! | [`Error::NotConnected`] | operations needing a session | Call `connect` (or `start_stream`) first |
//! | [`Error::AlreadyConnected`] | `Session::connect` | Disconnect before connecting again |
//! | [`Error::Decode`] | codec helpers | Never raised by dispatch; bad packets are dropped |
//!
//! Teardown (`stop_stream`, `disconnect`) never returns an error, and a failed
//! keep-alive write only stops streaming. The remaining variants are transport
//! errors that surface through the operation that triggered them.

use std::time::Duration;

use thiserror::Error;

use flow_types::DecodeError;

/// Errors that can occur when communicating with Flow 2 devices.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted without an active, authenticated session.
    #[error("Not connected to device")]
    NotConnected,

    /// `connect` called on a session that is not disconnected.
    #[error("Session is already connected")]
    AlreadyConnected,

    /// Transport connect or the initial handshake could not be established.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// The device rejected the authentication key.
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed {
        /// The device identifier that rejected authentication.
        device_id: Option<String>,
        /// Transport-level description of the rejection.
        reason: String,
    },

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Write operation failed.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// A payload could not be interpreted.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Device could not be found, or is out of range.
    OutOfRange,
    /// Connection attempt timed out.
    Timeout,
    /// The device dropped the link during the handshake.
    Rejected,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "device not found or out of range"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why a device was not found.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified name/address not found.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a write failure for a characteristic.
    pub fn write_failed(uuid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            uuid: uuid.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Create a connection failure with a string reason.
    ///
    /// This is a convenience method that wraps the string in `ConnectionFailureReason::Other`.
    pub fn connection_failed_str(device_id: Option<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            device_id,
            reason: ConnectionFailureReason::Other(reason.into()),
        }
    }

    /// Whether this error indicates the device rejected authentication.
    ///
    /// BLE stacks report a rejected key either as a permission error or as an
    /// ATT "insufficient authentication/authorization" status folded into the
    /// error text, so both are checked.
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            Error::AuthenticationFailed { .. } => true,
            Error::Bluetooth(btleplug::Error::PermissionDenied) => true,
            Error::ConnectionFailed { .. } | Error::NotConnected | Error::Timeout { .. } => false,
            other => {
                let message = other.to_string().to_lowercase();
                message.contains("authentication") || message.contains("authoriz")
            }
        }
    }

    /// Map a failure during connect or the authentication write onto the
    /// error reported by `Session::connect`.
    pub(crate) fn into_connect_failure(self, device_id: &str) -> Self {
        let device_id = Some(device_id.to_string());

        if self.is_auth_rejection() {
            let reason = match self {
                Error::AuthenticationFailed { reason, .. } => reason,
                other => other.to_string(),
            };
            return Error::AuthenticationFailed { device_id, reason };
        }

        let reason = match self {
            Error::ConnectionFailed { reason, .. } => reason,
            Error::Timeout { .. } => ConnectionFailureReason::Timeout,
            Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter) => {
                ConnectionFailureReason::AdapterUnavailable
            }
            Error::DeviceNotFound(_) => ConnectionFailureReason::OutOfRange,
            Error::Bluetooth(btleplug::Error::DeviceNotFound) => {
                ConnectionFailureReason::OutOfRange
            }
            Error::Bluetooth(btleplug::Error::NotConnected) => ConnectionFailureReason::Rejected,
            Error::Bluetooth(e) => ConnectionFailureReason::BleError(e.to_string()),
            other => ConnectionFailureReason::Other(other.to_string()),
        };
        Error::ConnectionFailed { device_id, reason }
    }
}

/// Result type alias using flow-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
