//! Binding each payload type to its wire encoding.

use serde::{Serialize, de::DeserializeOwned};

use crate::codec::{BincodeCodec, Codec, JsonCodec};
use crate::{ArmyMove, GameLog, PlayingState, ProtocolError, RecognitionOfWar};

/// Which [`Codec`] a payload type travels with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Bincode,
}

impl Encoding {
    /// The MIME type published alongside payloads in this encoding.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => JsonCodec::CONTENT_TYPE,
            Self::Bincode => BincodeCodec::CONTENT_TYPE,
        }
    }

    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Json => JsonCodec.encode(value),
            Self::Bincode => BincodeCodec.encode(value),
        }
    }

    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T, ProtocolError> {
        match self {
            Self::Json => JsonCodec.decode(data),
            Self::Bincode => BincodeCodec.decode(data),
        }
    }
}

/// A payload that can be published and subscribed to.
///
/// The encoding is a property of the type, so a subscriber's decode path
/// is fixed when it is registered.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const ENCODING: Encoding;

    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Self::ENCODING.encode(self)
    }

    fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        Self::ENCODING.decode(data)
    }
}

impl Message for PlayingState {
    const ENCODING: Encoding = Encoding::Json;
}

impl Message for ArmyMove {
    const ENCODING: Encoding = Encoding::Json;
}

impl Message for RecognitionOfWar {
    const ENCODING: Encoding = Encoding::Json;
}

impl Message for GameLog {
    const ENCODING: Encoding = Encoding::Bincode;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_logs_are_bincode() {
        assert_eq!(GameLog::ENCODING, Encoding::Bincode);
        assert_eq!(GameLog::ENCODING.content_type(), "application/x-bincode");
    }

    #[test]
    fn test_events_are_json() {
        assert_eq!(PlayingState::ENCODING, Encoding::Json);
        assert_eq!(ArmyMove::ENCODING, Encoding::Json);
        assert_eq!(RecognitionOfWar::ENCODING, Encoding::Json);
    }

    #[test]
    fn test_json_payload_does_not_decode_as_game_log() {
        let bytes = PlayingState { is_paused: true }.encode().unwrap();
        assert!(matches!(
            GameLog::decode(&bytes),
            Err(ProtocolError::Decode(_))
        ));
    }
}
