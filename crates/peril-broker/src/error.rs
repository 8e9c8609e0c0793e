/// Errors that can occur talking to the broker.
///
/// The variants mirror the AMQP reply codes callers need to branch on:
/// `406 PRECONDITION_FAILED`, `404 NOT_FOUND` and `405 RESOURCE_LOCKED`.
/// Everything else is folded into [`Protocol`](Self::Protocol).
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// The broker could not be reached, or the connection dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A declaration conflicts with an existing entity's properties.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The exchange or queue does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The queue is exclusive to another connection.
    #[error("resource locked: {0}")]
    ResourceLocked(String),

    /// The channel was closed, by us or by a previous channel error.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// Any other broker-reported failure.
    #[error("broker error: {0}")]
    Protocol(String),
}

impl BrokerError {
    /// `true` for an argument or kind mismatch on redeclaration.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }

    /// `true` when the target entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
