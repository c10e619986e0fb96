//! Error types for packet decoding in flow-types.

use thiserror::Error;

/// Errors that can occur when decoding Flow 2 notification payloads.
///
/// Decoding never panics; callers treat these as "could not interpret"
/// rather than as a protocol violation.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload is not the length the decoder requires.
    #[error("Invalid packet length: need {required} bytes, got {actual}")]
    InvalidLength {
        /// Number of bytes the decoder needs.
        required: usize,
        /// Number of bytes actually provided.
        actual: usize,
    },

    /// The embedded epoch value does not map to a calendar time.
    #[error("Invalid timestamp: {0} is not a representable Unix time")]
    InvalidTimestamp(u32),
}

/// Result type alias using flow-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_length_display() {
        let err = DecodeError::InvalidLength {
            required: 20,
            actual: 7,
        };
        assert_eq!(err.to_string(), "Invalid packet length: need 20 bytes, got 7");
    }

    #[test]
    fn test_invalid_timestamp_display() {
        let err = DecodeError::InvalidTimestamp(42);
        assert!(err.to_string().contains("42"));
    }
}
