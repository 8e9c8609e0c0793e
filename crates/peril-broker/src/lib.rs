//! Message broker abstraction for Peril.
//!
//! Provides the [`Connection`], [`Channel`] and [`Delivery`] traits that
//! abstract over an AMQP 0-9-1 style broker: durable and exclusive queues,
//! `direct` and `topic` exchanges, bindings, prefetch windows and manual
//! acknowledgments.
//!
//! # Feature Flags
//!
//! - `amqp` (default): RabbitMQ backend via `lapin`
//! - `memory` (default): in-process broker with the same semantics,
//!   used by tests and local demos

mod error;
#[cfg(feature = "amqp")]
mod amqp;
#[cfg(feature = "memory")]
mod memory;
mod topic;

pub use error::BrokerError;
#[cfg(feature = "amqp")]
pub use amqp::{AmqpChannel, AmqpConnection, AmqpDelivery};
#[cfg(feature = "memory")]
pub use memory::{MemoryBroker, MemoryChannel, MemoryConnection, MemoryDelivery, QueueSnapshot};
pub use topic::topic_matches;

use std::fmt;
use std::future::Future;

use futures_util::stream::BoxStream;

/// Opaque identifier for a broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How an exchange routes messages to bound queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Exact routing-key match.
    Direct,
    /// Dot-separated pattern match with `*` (one word) and `#` (zero or
    /// more words).
    Topic,
}

impl ExchangeKind {
    /// The AMQP name of this exchange type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Topic => "topic",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags fixed at a queue's first declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueOptions {
    /// Survives a broker restart.
    pub durable: bool,
    /// Owned by the declaring connection; deleted when it closes.
    pub exclusive: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
}

/// Optional `x-` arguments attached to a queue declaration.
///
/// Two declarations of the same queue must carry equal arguments, or the
/// broker answers with [`BrokerError::PreconditionFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueArguments {
    /// `x-dead-letter-exchange`: where rejected messages are republished.
    pub dead_letter_exchange: Option<String>,
    /// `x-dead-letter-routing-key`: routing key used for dead-lettering.
    /// Falls back to the message's original key when absent.
    pub dead_letter_routing_key: Option<String>,
}

impl QueueArguments {
    /// Arguments routing rejected messages to `exchange` under `routing_key`.
    pub fn dead_letter(exchange: &str, routing_key: &str) -> Self {
        Self {
            dead_letter_exchange: Some(exchange.to_string()),
            dead_letter_routing_key: Some(routing_key.to_string()),
        }
    }
}

/// What the broker reports back after a queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    /// The queue name (server-generated if the declaration used `""`).
    pub name: String,
    /// Messages ready for delivery.
    pub message_count: u32,
    /// Active consumers.
    pub consumer_count: u32,
}

/// Stream of deliveries produced by [`Channel::basic_consume`].
pub type DeliveryStream<D> = BoxStream<'static, Result<D, BrokerError>>;

/// A connection to the broker. Channels are opened on top of it.
pub trait Connection: Send + Sync + 'static {
    /// The channel type produced by this connection.
    type Channel: Channel;

    /// Opens a new channel.
    ///
    /// A channel that hit a channel-level error (for example
    /// [`BrokerError::PreconditionFailed`]) is closed by the broker; open
    /// a fresh one to continue.
    fn create_channel(
        &self,
    ) -> impl Future<Output = Result<Self::Channel, BrokerError>> + Send;

    /// Closes the connection. Exclusive queues it owns are deleted.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

/// A session on a connection: the unit that declares, publishes and
/// consumes.
pub trait Channel: Send + Sync + 'static {
    /// The delivery type handed out by [`basic_consume`](Self::basic_consume).
    type Delivery: Delivery;

    /// Declares a durable, non-auto-deleted exchange.
    fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Declares a queue, or checks an existing one against `options` and
    /// `arguments`.
    fn queue_declare(
        &self,
        name: &str,
        options: QueueOptions,
        arguments: &QueueArguments,
    ) -> impl Future<Output = Result<QueueInfo, BrokerError>> + Send;

    /// Deletes a queue and returns the number of messages it held.
    fn queue_delete(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<u32, BrokerError>> + Send;

    /// Binds `queue` to `exchange` under `routing_key`.
    fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Limits unacknowledged deliveries per consumer on this channel.
    /// `0` means unlimited.
    fn basic_qos(
        &self,
        prefetch_count: u16,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Publishes `payload` to `exchange` under `routing_key`.
    ///
    /// Unroutable messages are dropped silently, as AMQP does without the
    /// `mandatory` flag.
    fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Starts consuming `queue` with manual acknowledgments.
    fn basic_consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> impl Future<Output = Result<DeliveryStream<Self::Delivery>, BrokerError>> + Send;

    /// Closes the channel. Unacknowledged deliveries go back to their
    /// queues.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A single message handed to a consumer, awaiting settlement.
pub trait Delivery: Send + Sync + 'static {
    /// The message body.
    fn data(&self) -> &[u8];

    /// The routing key the message was published with.
    fn routing_key(&self) -> &str;

    /// `true` if the broker delivered this message before.
    fn redelivered(&self) -> bool;

    /// Acknowledges the message, removing it from its queue.
    fn ack(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Rejects the message. With `requeue` it goes back to its queue,
    /// otherwise it is dead-lettered (or dropped if the queue has no
    /// dead-letter exchange).
    fn nack(
        &self,
        requeue: bool,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_exchange_kind_names() {
        assert_eq!(ExchangeKind::Direct.to_string(), "direct");
        assert_eq!(ExchangeKind::Topic.as_str(), "topic");
    }

    #[test]
    fn test_dead_letter_arguments() {
        let args = QueueArguments::dead_letter("dlx", "dlq");
        assert_eq!(args.dead_letter_exchange.as_deref(), Some("dlx"));
        assert_eq!(args.dead_letter_routing_key.as_deref(), Some("dlq"));
        assert_ne!(args, QueueArguments::default());
    }
}
