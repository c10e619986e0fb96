//! Platform-agnostic types for Flow 2 air quality monitors.
//!
//! This crate is the packet codec used by flow-core. It has no I/O and no
//! state: it maps raw notification bytes to typed values.
//!
//! # Features
//!
//! - Live PM2.5 reading decoding
//! - History block wrapping with best-effort timestamp decoding
//! - Length-based packet classification
//! - UUID constants for BLE characteristics
//!
//! # Example
//!
//! ```
//! use flow_types::{PacketKind, decode_live_reading};
//!
//! let mut packet = [0u8; 20];
//! packet[8..12].copy_from_slice(&12.5f32.to_le_bytes());
//!
//! assert_eq!(PacketKind::classify(packet.len()), PacketKind::Live);
//! assert_eq!(decode_live_reading(&packet), Ok(12.5));
//! ```

pub mod error;
pub mod packet;
pub mod uuid;

pub use error::{DecodeError, DecodeResult};
pub use packet::{
    HistoryBlock, LIVE_PACKET_LEN, Notification, PM25_OFFSET, PacketKind, decode_history_timestamp,
    decode_history_timestamp_default, decode_live_reading,
};
pub use uuid as uuids;
