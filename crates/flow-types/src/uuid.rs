//! Bluetooth UUIDs for Flow 2 devices.
//!
//! The vendor characteristics share the base `3039xxxx-4e55-4c10-9dce-b654f35fdf99`.

use uuid::{Uuid, uuid};

// --- Flow 2 Characteristic UUIDs ---

/// Authentication characteristic. The fixed key is written here right after connecting.
pub const AUTH: Uuid = uuid!("30390102-4e55-4c10-9dce-b654f35fdf99");

/// Command characteristic (activation, keep-alive and fetch-history writes).
pub const COMMAND: Uuid = uuid!("30390401-4e55-4c10-9dce-b654f35fdf99");

/// Data characteristic. Live readings and history blocks arrive here as notifications.
pub const DATA: Uuid = uuid!("30390501-4e55-4c10-9dce-b654f35fdf99");

// --- Standard BLE UUIDs ---

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic (one byte, percent).
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_uuids_share_base() {
        for id in [AUTH, COMMAND, DATA] {
            assert!(id.to_string().ends_with("-4e55-4c10-9dce-b654f35fdf99"));
            assert!(id.to_string().starts_with("3039"));
        }
    }

    #[test]
    fn test_vendor_uuids_are_distinct() {
        assert_ne!(AUTH, COMMAND);
        assert_ne!(COMMAND, DATA);
        assert_ne!(AUTH, DATA);
    }

    #[test]
    fn test_battery_level_uuid() {
        assert_eq!(
            BATTERY_LEVEL.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }
}
