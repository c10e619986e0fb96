//! Notification packet layout and decoding.
//!
//! The Flow 2 pushes two payload shapes over a single data characteristic and
//! they are told apart purely by length:
//!
//! | Length | Shape | Contents |
//! |--------|-------|----------|
//! | exactly 20 | live reading | `f32` PM2.5 (µg/m³), little-endian, at offset 8 |
//! | more than 20 | history block | opaque vendor bytes, optional `u32` Unix time at offset 0 |
//! | less than 20 | unknown | dropped |
//!
//! The decoders here are total: they return a [`DecodeError`] instead of
//! panicking on malformed input.

use core::fmt;

use bytes::Bytes;
use time::OffsetDateTime;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, DecodeResult};

/// Size in bytes of a live reading notification.
pub const LIVE_PACKET_LEN: usize = 20;

/// Byte offset of the PM2.5 float inside a live reading.
pub const PM25_OFFSET: usize = 8;

/// Size in bytes of an embedded history timestamp.
pub const TIMESTAMP_LEN: usize = 4;

/// Packet shape, determined only by payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PacketKind {
    /// A 20-byte live reading.
    Live,
    /// A history block longer than a live reading.
    History,
    /// Anything shorter than a live reading.
    Unknown,
}

impl PacketKind {
    /// Classify a payload by its length.
    ///
    /// ```
    /// use flow_types::PacketKind;
    ///
    /// assert_eq!(PacketKind::classify(20), PacketKind::Live);
    /// assert_eq!(PacketKind::classify(88), PacketKind::History);
    /// assert_eq!(PacketKind::classify(3), PacketKind::Unknown);
    /// ```
    #[must_use]
    pub fn classify(len: usize) -> Self {
        match len {
            LIVE_PACKET_LEN => PacketKind::Live,
            n if n > LIVE_PACKET_LEN => PacketKind::History,
            _ => PacketKind::Unknown,
        }
    }
}

/// Decode the PM2.5 concentration from a live reading packet.
///
/// The input must be exactly [`LIVE_PACKET_LEN`] bytes. The value is passed
/// through as-is; NaN and out-of-range floats are not rejected.
///
/// ```
/// use flow_types::decode_live_reading;
///
/// let mut packet = [0u8; 20];
/// packet[8..12].copy_from_slice(&35.5f32.to_le_bytes());
/// assert_eq!(decode_live_reading(&packet), Ok(35.5));
/// ```
pub fn decode_live_reading(data: &[u8]) -> DecodeResult<f32> {
    if data.len() != LIVE_PACKET_LEN {
        return Err(DecodeError::InvalidLength {
            required: LIVE_PACKET_LEN,
            actual: data.len(),
        });
    }

    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[PM25_OFFSET..PM25_OFFSET + 4]);
    Ok(f32::from_le_bytes(raw))
}

/// Decode a Unix timestamp embedded in a history block at `offset`.
///
/// Reads a little-endian `u32` of epoch seconds. Returns
/// [`DecodeError::InvalidLength`] when fewer than `offset + 4` bytes are
/// available.
pub fn decode_history_timestamp(data: &[u8], offset: usize) -> DecodeResult<OffsetDateTime> {
    let required = offset.checked_add(TIMESTAMP_LEN).ok_or(DecodeError::InvalidLength {
        required: usize::MAX,
        actual: data.len(),
    })?;
    if data.len() < required {
        return Err(DecodeError::InvalidLength {
            required,
            actual: data.len(),
        });
    }

    let mut raw = [0u8; TIMESTAMP_LEN];
    raw.copy_from_slice(&data[offset..required]);
    let epoch = u32::from_le_bytes(raw);

    OffsetDateTime::from_unix_timestamp(i64::from(epoch))
        .map_err(|_| DecodeError::InvalidTimestamp(epoch))
}

/// [`decode_history_timestamp`] at offset 0.
pub fn decode_history_timestamp_default(data: &[u8]) -> DecodeResult<OffsetDateTime> {
    decode_history_timestamp(data, 0)
}

/// A raw history block, kept exactly as the device sent it.
///
/// The format is vendor-defined and opaque; only the leading timestamp has a
/// known (best-effort) interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct HistoryBlock {
    bytes: Bytes,
}

impl HistoryBlock {
    /// Wrap raw payload bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The raw payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the block, returning the raw payload.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the leading timestamp.
    pub fn timestamp(&self) -> DecodeResult<OffsetDateTime> {
        decode_history_timestamp_default(&self.bytes)
    }

    /// Decode a timestamp at an arbitrary offset.
    pub fn timestamp_at(&self, offset: usize) -> DecodeResult<OffsetDateTime> {
        decode_history_timestamp(&self.bytes, offset)
    }

    /// Lowercase hex of the first `n` bytes (or fewer if the block is shorter).
    pub fn header_hex(&self, n: usize) -> String {
        let end = n.min(self.bytes.len());
        hex::encode(&self.bytes[..end])
    }
}

impl AsRef<[u8]> for HistoryBlock {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for HistoryBlock {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// A decoded notification, as delivered to observers.
///
/// Serializes as `{"kind": "live", "value": 35.5}` or
/// `{"kind": "history", "value": [..raw bytes..]}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", content = "value", rename_all = "snake_case")
)]
pub enum Notification {
    /// PM2.5 concentration in µg/m³.
    Live(f32),
    /// Raw history block.
    History(HistoryBlock),
}

impl Notification {
    /// The observer tag: `"live"` or `"history"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Live(_) => "live",
            Notification::History(_) => "history",
        }
    }

    /// The PM2.5 value, if this is a live reading.
    pub fn pm25(&self) -> Option<f32> {
        match self {
            Notification::Live(value) => Some(*value),
            Notification::History(_) => None,
        }
    }

    /// The history block, if this is one.
    pub fn history(&self) -> Option<&HistoryBlock> {
        match self {
            Notification::Live(_) => None,
            Notification::History(block) => Some(block),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Live(value) => write!(f, "PM2.5: {:.2} µg/m³", value),
            Notification::History(block) => write!(f, "history block ({} bytes)", block.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_packet(value: f32) -> [u8; LIVE_PACKET_LEN] {
        let mut packet = [0u8; LIVE_PACKET_LEN];
        packet[PM25_OFFSET..PM25_OFFSET + 4].copy_from_slice(&value.to_le_bytes());
        packet
    }

    #[test]
    fn test_decode_live_reading() {
        assert_eq!(decode_live_reading(&live_packet(35.5)), Ok(35.5));
    }

    #[test]
    fn test_decode_live_reading_ignores_surrounding_bytes() {
        let mut packet = live_packet(12.25);
        packet[..8].fill(0xAA);
        packet[12..].fill(0x55);
        assert_eq!(decode_live_reading(&packet), Ok(12.25));
    }

    #[test]
    fn test_decode_live_reading_passes_nan_through() {
        let value = decode_live_reading(&live_packet(f32::NAN)).unwrap();
        assert!(value.is_nan());
    }

    #[test]
    fn test_decode_live_reading_wrong_length() {
        assert_eq!(
            decode_live_reading(&[0u8; 19]),
            Err(DecodeError::InvalidLength {
                required: 20,
                actual: 19
            })
        );
        assert!(decode_live_reading(&[0u8; 21]).is_err());
        assert!(decode_live_reading(&[]).is_err());
    }

    #[test]
    fn test_decode_history_timestamp() {
        let mut block = vec![0u8; 25];
        block[..4].copy_from_slice(&[0x64, 0x00, 0x00, 0x00]);
        let ts = decode_history_timestamp(&block, 0).unwrap();
        assert_eq!(ts.unix_timestamp(), 100);
    }

    #[test]
    fn test_decode_history_timestamp_with_offset() {
        let mut block = vec![0u8; 30];
        block[6..10].copy_from_slice(&1_700_000_000u32.to_le_bytes());
        let ts = decode_history_timestamp(&block, 6).unwrap();
        assert_eq!(ts.unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_decode_history_timestamp_max_u32() {
        let ts = decode_history_timestamp(&[0xFF; 4], 0).unwrap();
        assert_eq!(ts.unix_timestamp(), i64::from(u32::MAX));
    }

    #[test]
    fn test_decode_history_timestamp_too_short() {
        assert_eq!(
            decode_history_timestamp(&[1, 2, 3], 0),
            Err(DecodeError::InvalidLength {
                required: 4,
                actual: 3
            })
        );
        assert_eq!(
            decode_history_timestamp(&[0u8; 8], 5),
            Err(DecodeError::InvalidLength {
                required: 9,
                actual: 8
            })
        );
    }

    #[test]
    fn test_decode_history_timestamp_offset_overflow() {
        assert!(matches!(
            decode_history_timestamp(&[0u8; 8], usize::MAX),
            Err(DecodeError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_classify() {
        assert_eq!(PacketKind::classify(0), PacketKind::Unknown);
        assert_eq!(PacketKind::classify(19), PacketKind::Unknown);
        assert_eq!(PacketKind::classify(20), PacketKind::Live);
        assert_eq!(PacketKind::classify(21), PacketKind::History);
        assert_eq!(PacketKind::classify(88), PacketKind::History);
    }

    #[test]
    fn test_history_block_helpers() {
        let mut raw = vec![0x64, 0x00, 0x00, 0x00];
        raw.extend_from_slice(&[0xAB; 21]);
        let block = HistoryBlock::from(raw.clone());

        assert_eq!(block.len(), 25);
        assert!(!block.is_empty());
        assert_eq!(block.as_bytes(), raw.as_slice());
        assert_eq!(block.timestamp().unwrap().unix_timestamp(), 100);
        assert_eq!(block.header_hex(6), "64000000abab");
        assert_eq!(block.header_hex(100).len(), 50);
        assert_eq!(block.header_hex(0), "");
    }

    #[test]
    fn test_notification_kind() {
        assert_eq!(Notification::Live(1.0).kind(), "live");
        let history = Notification::History(HistoryBlock::new(vec![0u8; 21]));
        assert_eq!(history.kind(), "history");
        assert_eq!(history.pm25(), None);
        assert_eq!(history.history().map(HistoryBlock::len), Some(21));
    }

    #[test]
    fn test_notification_display() {
        assert_eq!(Notification::Live(35.5).to_string(), "PM2.5: 35.50 µg/m³");
        let history = Notification::History(HistoryBlock::new(vec![0u8; 88]));
        assert_eq!(history.to_string(), "history block (88 bytes)");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_notification_serialization() {
        let json = serde_json::to_string(&Notification::Live(35.5)).unwrap();
        assert_eq!(json, r#"{"kind":"live","value":35.5}"#);

        let history = Notification::History(HistoryBlock::new(vec![1u8, 2, 3]));
        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(json, r#"{"kind":"history","value":[1,2,3]}"#);
    }
}
