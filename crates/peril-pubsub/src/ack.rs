/// A handler's verdict on one delivery.
///
/// The delivery loop, not the handler, turns this into a broker
/// acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckDecision {
    /// Processed; remove the message from its queue.
    Ack,
    /// Not processed; put the message back for another attempt.
    RequeueAndRetry,
    /// Never processable; reject without requeue. Durable queues route
    /// it to the dead-letter queue.
    #[default]
    DiscardPermanently,
}

impl AckDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::RequeueAndRetry => "requeue",
            Self::DiscardPermanently => "discard",
        }
    }
}
