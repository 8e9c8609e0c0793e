//! Exchange and queue lifecycle.
//!
//! Every queue Peril declares carries dead-letter arguments. Queue flags
//! and arguments are fixed at first declaration, so when an older
//! declaration disagrees the queue is deleted and declared again rather
//! than failing the subscriber.

use peril_broker::{
    BrokerError, Channel, Connection, ExchangeKind, QueueArguments, QueueInfo, QueueOptions,
};
use peril_protocol::routing::{
    EXCHANGE_PERIL_DEAD_LETTER, EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, QUEUE_PERIL_DLQ,
};

use crate::PubSubError;

/// The two queue classes Peril uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDurability {
    /// Shared queues (`war`, `game_logs`): survive restarts, dead-letter
    /// rejected messages.
    Durable,
    /// Per-player queues: exclusive to the connection, deleted with it.
    Transient,
}

impl QueueDurability {
    pub fn options(self) -> QueueOptions {
        match self {
            Self::Durable => QueueOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
            },
            Self::Transient => QueueOptions {
                durable: false,
                exclusive: true,
                auto_delete: true,
            },
        }
    }
}

/// Arguments attached to every Peril queue.
pub fn dead_letter_arguments() -> QueueArguments {
    QueueArguments::dead_letter(EXCHANGE_PERIL_DEAD_LETTER, QUEUE_PERIL_DLQ)
}

/// Declares a durable exchange.
///
/// Idempotent for the same kind. A kind mismatch yields
/// [`PubSubError::TopologyConflict`] and closes `channel`.
pub async fn declare_exchange<Ch: Channel>(
    channel: &Ch,
    name: &str,
    kind: ExchangeKind,
) -> Result<(), PubSubError> {
    match channel.exchange_declare(name, kind).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_precondition_failed() => Err(PubSubError::TopologyConflict {
            name: name.to_string(),
            requested: kind,
        }),
        Err(err) => Err(err.into()),
    }
}

/// Declares the direct, topic and dead-letter exchanges.
pub async fn declare_peril_exchanges<C: Connection>(conn: &C) -> Result<(), PubSubError> {
    let channel = conn.create_channel().await?;
    declare_exchange(&channel, EXCHANGE_PERIL_DIRECT, ExchangeKind::Direct).await?;
    declare_exchange(&channel, EXCHANGE_PERIL_TOPIC, ExchangeKind::Topic).await?;
    declare_exchange(&channel, EXCHANGE_PERIL_DEAD_LETTER, ExchangeKind::Direct).await?;
    channel.close().await?;
    tracing::info!("peril exchanges declared");
    Ok(())
}

/// Declares `queue` with the given durability and binds it to `exchange`
/// under `key`.
///
/// Returns the channel the queue was declared on, ready for consuming,
/// along with the broker's view of the queue.
///
/// ## Durability
///
/// - [`QueueDurability::Durable`] → survives broker restarts and is shared
///   by every process that declares it (the `war` and `game_logs` queues).
///   Rejected messages from it must be kept, so this also declares
///   `peril_dlq` and binds it to the dead-letter exchange.
/// - [`QueueDurability::Transient`] → exclusive to this connection and
///   deleted when the connection closes. Used for per-player queues such
///   as `pause.<username>`. It carries the same dead-letter arguments,
///   but nothing requires `peril_dlq` to exist for it.
///
/// ## Recovery
///
/// AMQP refuses to redeclare a queue with different arguments and closes
/// the channel with a 406. That happens when an older build declared the
/// queue without dead-letter arguments. Rather than fail forever, the
/// queue is deleted and declared again once, on a fresh channel. Any
/// messages still in the old queue are lost, which is acceptable for a
/// queue whose setup was wrong to begin with.
pub async fn declare_and_bind<C: Connection>(
    conn: &C,
    exchange: &str,
    queue: &str,
    key: &str,
    durability: QueueDurability,
) -> Result<(C::Channel, QueueInfo), PubSubError> {
    let mut channel = conn.create_channel().await?;
    declare_exchange(&channel, EXCHANGE_PERIL_DEAD_LETTER, ExchangeKind::Direct).await?;

    let options = durability.options();
    let arguments = dead_letter_arguments();

    let info = match channel.queue_declare(queue, options, &arguments).await {
        Ok(info) => info,
        Err(err) if err.is_precondition_failed() => {
            tracing::warn!(queue, %err, "queue declared with different arguments, recreating");
            channel = conn.create_channel().await?;
            declare_exchange(&channel, EXCHANGE_PERIL_DEAD_LETTER, ExchangeKind::Direct).await?;
            recreate_queue(&channel, queue, options, &arguments).await?
        }
        Err(err) => return Err(err.into()),
    };

    if durability == QueueDurability::Durable {
        channel = ensure_dead_letter_queue(conn, channel).await?;
    }

    channel.queue_bind(&info.name, exchange, key).await?;
    tracing::debug!(queue = %info.name, exchange, key, ?durability, "queue bound");

    Ok((channel, info))
}

/// Deletes `name` (a missing queue is fine) and declares it again.
async fn recreate_queue<Ch: Channel>(
    channel: &Ch,
    name: &str,
    options: QueueOptions,
    arguments: &QueueArguments,
) -> Result<QueueInfo, BrokerError> {
    match channel.queue_delete(name).await {
        Ok(purged) => tracing::info!(queue = name, purged, "queue deleted for redeclaration"),
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }
    channel.queue_declare(name, options, arguments).await
}

async fn declare_dead_letter_queue<Ch: Channel>(channel: &Ch) -> Result<(), BrokerError> {
    channel
        .queue_declare(
            QUEUE_PERIL_DLQ,
            QueueDurability::Durable.options(),
            &QueueArguments::default(),
        )
        .await?;
    channel
        .queue_bind(QUEUE_PERIL_DLQ, EXCHANGE_PERIL_DEAD_LETTER, QUEUE_PERIL_DLQ)
        .await
}

/// Declares and binds `peril_dlq`, recreating it on an argument mismatch.
///
/// Hands back the channel to keep using, which is a fresh one if the
/// first attempt closed `channel`.
async fn ensure_dead_letter_queue<C: Connection>(
    conn: &C,
    channel: C::Channel,
) -> Result<C::Channel, PubSubError> {
    match declare_dead_letter_queue(&channel).await {
        Ok(()) => Ok(channel),
        Err(err) if err.is_precondition_failed() => {
            tracing::warn!(queue = QUEUE_PERIL_DLQ, %err, "dead-letter queue mismatch, recreating");
            let channel = conn.create_channel().await?;
            recreate_queue(
                &channel,
                QUEUE_PERIL_DLQ,
                QueueDurability::Durable.options(),
                &QueueArguments::default(),
            )
            .await?;
            channel
                .queue_bind(QUEUE_PERIL_DLQ, EXCHANGE_PERIL_DEAD_LETTER, QUEUE_PERIL_DLQ)
                .await?;
            Ok(channel)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_options() {
        let options = QueueDurability::Durable.options();
        assert!(options.durable);
        assert!(!options.exclusive);
        assert!(!options.auto_delete);
    }

    #[test]
    fn test_transient_options() {
        let options = QueueDurability::Transient.options();
        assert!(!options.durable);
        assert!(options.exclusive);
        assert!(options.auto_delete);
    }

    #[test]
    fn test_dead_letter_arguments_point_at_dlq() {
        let args = dead_letter_arguments();
        assert_eq!(args.dead_letter_exchange.as_deref(), Some("dead-letter-peril"));
        assert_eq!(args.dead_letter_routing_key.as_deref(), Some("peril_dlq"));
    }
}
