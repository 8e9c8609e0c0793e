//! Unified error type for Peril.

use peril_broker::BrokerError;
use peril_game::GameError;
use peril_protocol::ProtocolError;
use peril_pubsub::PubSubError;

/// Top-level error that wraps all crate-specific errors.
///
/// Client and server methods return this single type; `?` converts the
/// sub-crate errors through the `#[from]` impls.
#[derive(Debug, thiserror::Error)]
pub enum PerilError {
    /// The broker rejected an operation or could not be reached.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Declaring, publishing or subscribing failed.
    #[error(transparent)]
    PubSub(#[from] PubSubError),

    /// A payload or a location/rank name was invalid.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A game command was rejected; nothing was published.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Writing a game log failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_broker_error() {
        let err: PerilError = BrokerError::Connection("refused".into()).into();
        assert!(matches!(err, PerilError::Broker(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_from_pubsub_error() {
        let err: PerilError = PubSubError::Broker(BrokerError::NotFound("war".into())).into();
        assert!(matches!(err, PerilError::PubSub(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: PerilError = ProtocolError::InvalidLocation("mars".into()).into();
        assert!(matches!(err, PerilError::Protocol(_)));
        assert!(err.to_string().contains("mars"));
    }

    #[test]
    fn test_from_game_error() {
        let err: PerilError = GameError::Paused.into();
        assert!(matches!(err, PerilError::Game(GameError::Paused)));
    }
}
