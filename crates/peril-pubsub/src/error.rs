//! Error types for the pub/sub layer.

use peril_broker::{BrokerError, ExchangeKind};
use peril_protocol::ProtocolError;

/// Errors from declaring, publishing or subscribing.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// The broker rejected an operation or could not be reached.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// An exchange already exists with a different kind.
    ///
    /// Unlike a queue argument mismatch this is not recovered: deleting
    /// a shared exchange would drop every binding other processes made.
    #[error("exchange '{name}' already exists with a kind other than {requested}")]
    TopologyConflict { name: String, requested: ExchangeKind },

    /// A subscription asked for a prefetch window of zero, which AMQP
    /// treats as unlimited.
    #[error("prefetch must be at least 1")]
    UnboundedPrefetch,

    /// A payload failed to encode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
