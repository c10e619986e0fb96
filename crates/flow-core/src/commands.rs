//! BLE command constants for Flow 2 devices.
//!
//! These byte sequences are fixed by the device firmware. They are the
//! defaults of [`ProtocolConfig`](crate::config::ProtocolConfig), which lets a
//! deployment override them without rebuilding.

/// Authentication key, written with response to the auth characteristic
/// immediately after connecting.
pub const AUTH_KEY: &[u8] = &[0xa5, 0x97, 0x14, 0x69];

/// Activation command, written to the command characteristic to start the
/// data stream. Re-sent without response as the keep-alive pulse.
pub const ACTIVATE: &[u8] = &[0x01, 0x00];

/// Fetch-history command. The device answers with history blocks on the
/// data characteristic.
pub const FETCH_HISTORY: &[u8] = &[0x03, 0x00];
