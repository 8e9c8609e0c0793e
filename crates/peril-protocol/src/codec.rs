//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between Rust types and raw bytes. Two are provided:
//! [`JsonCodec`] (structured text, readable in the broker's management UI)
//! and [`BincodeCodec`] (compact binary, used for high-volume game logs).

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `decode` must never panic on malformed input: callers rely on a
/// [`ProtocolError::Decode`] to discard a bad message and keep consuming.
pub trait Codec: Send + Sync + 'static {
    /// The MIME type stamped on published messages.
    const CONTENT_TYPE: &'static str;

    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use peril_protocol::{Codec, JsonCodec, PlayingState};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&PlayingState { is_paused: true }).unwrap();
/// assert_eq!(bytes, br#"{"isPaused":true}"#);
///
/// let decoded: PlayingState = codec.decode(&bytes).unwrap();
/// assert!(decoded.is_paused);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    const CONTENT_TYPE: &'static str = "application/json";

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// BincodeCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses `bincode`'s compact binary format.
///
/// Not self-describing: both ends must agree on the exact type.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    const CONTENT_TYPE: &'static str = "application/x-bincode";

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(value).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        bincode::deserialize(data).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameLog, Location, PlayingState, Unit, UnitRank};

    #[test]
    fn test_json_uses_camel_case_fields() {
        let bytes = JsonCodec
            .encode(&Unit {
                id: 3,
                rank: UnitRank::Cavalry,
                location: Location::Asia,
            })
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"id":3,"rank":"cavalry","location":"asia"}"#);
    }

    #[test]
    fn test_json_decode_garbage_is_decode_error() {
        let result: Result<PlayingState, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_decode_wrong_shape_is_decode_error() {
        let result: Result<PlayingState, _> = JsonCodec.decode(br#"{"paused":"yes"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_bincode_preserves_game_log() {
        let log = GameLog::new("alice", "All warfare is based on deception.");
        let bytes = BincodeCodec.encode(&log).unwrap();
        let decoded: GameLog = BincodeCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, log);
    }

    #[test]
    fn test_bincode_decode_truncated_is_decode_error() {
        let log = GameLog::new("alice", "hello");
        let bytes = BincodeCodec.encode(&log).unwrap();
        let result: Result<GameLog, _> = BincodeCodec.decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(JsonCodec::CONTENT_TYPE, "application/json");
        assert_eq!(BincodeCodec::CONTENT_TYPE, "application/x-bincode");
    }
}
