//! Acknowledgment-driven subscriptions.
//!
//! [`subscribe`] declares and binds a queue, then spawns one delivery loop
//! per subscription. Deliveries on a queue are handled one at a time, in
//! the order the broker hands them out; separate subscriptions run in
//! parallel.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use peril_broker::{BrokerError, Channel, Connection, Delivery, DeliveryStream};
use peril_protocol::Message;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::topology::{QueueDurability, declare_and_bind};
use crate::{AckDecision, PubSubError};

/// Default number of unacknowledged deliveries per consumer.
pub const DEFAULT_PREFETCH: u16 = 10;

/// Processes decoded messages of type `T`.
///
/// The delivery loop decodes each message, hands it to the handler, and
/// turns the returned [`AckDecision`] into an ack or a reject. The handler
/// never sees the raw delivery, so it can't forget to settle it.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → the handler lives inside a spawned Tokio task, which
///   may run on any worker thread.
/// - `'static` → the task outlives the call to [`subscribe`], so the
///   handler must own what it uses. Share game state through an `Arc`
///   captured by the closure, not through a borrow.
/// - the returned future is `Send` → it is awaited inside that same
///   spawned task.
///
/// ## Closures are handlers
///
/// There is a blanket implementation for any
/// `Fn(T) -> impl Future<Output = AckDecision>`, so the usual way to write
/// a handler is a closure that clones its captures into an `async move`
/// block:
///
/// ```rust,ignore
/// let state = Arc::clone(&state);
/// move |mv: ArmyMove| {
///     let state = Arc::clone(&state);
///     async move { /* inspect state, decide */ AckDecision::Ack }
/// }
/// ```
///
/// Handlers run one at a time per subscription. A handler that blocks
/// holds back its own queue, and the prefetch window stops the broker
/// from piling more deliveries onto it.
pub trait Handler<T>: Send + Sync + 'static {
    fn handle(&self, message: T) -> impl Future<Output = AckDecision> + Send;
}

impl<T, F, Fut> Handler<T> for F
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send,
{
    fn handle(&self, message: T) -> impl Future<Output = AckDecision> + Send {
        self(message)
    }
}

/// Per-subscription consumer settings.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Prefetch window, at least 1. [`subscribe`] rejects `0`, which the
    /// broker would read as unlimited.
    pub prefetch: u16,
    /// Consumer tag; empty lets the broker pick one.
    pub consumer_tag: String,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            prefetch: DEFAULT_PREFETCH,
            consumer_tag: String::new(),
        }
    }
}

impl SubscribeOptions {
    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }
}

/// Handle to a running delivery loop.
///
/// Dropping the handle leaves the loop running for as long as the broker
/// keeps delivering. Use [`shutdown`](Self::shutdown) to stop it cleanly.
pub struct Subscription {
    queue: String,
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// The name of the consumed queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// `true` once the delivery loop has exited.
    ///
    /// A loop only exits on its own when the broker stops delivering: the
    /// connection failed or the queue's consumer was cancelled. Owners
    /// poll this to notice that their subscription is dead.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop after the in-flight message is settled, closes its
    /// channel, and waits for it to exit. Unsettled deliveries return to
    /// the queue.
    pub async fn shutdown(self) {
        self.stop.notify_one();
        if let Err(err) = self.task.await {
            tracing::warn!(queue = %self.queue, %err, "delivery loop did not exit cleanly");
        }
    }
}

/// Declares and binds `queue`, then consumes it with `handler`.
///
/// Each delivery is decoded as `T`. A decode failure discards the message
/// permanently. Otherwise the handler's verdict settles it: `Ack` acks,
/// `RequeueAndRetry` rejects with requeue, `DiscardPermanently` rejects
/// without requeue. A handler that panics counts as `DiscardPermanently`.
pub async fn subscribe<C, T, H>(
    conn: &C,
    exchange: &str,
    queue: &str,
    key: &str,
    durability: QueueDurability,
    options: &SubscribeOptions,
    handler: H,
) -> Result<Subscription, PubSubError>
where
    C: Connection,
    T: Message,
    H: Handler<T>,
{
    if options.prefetch == 0 {
        return Err(PubSubError::UnboundedPrefetch);
    }
    let (channel, info) = declare_and_bind(conn, exchange, queue, key, durability).await?;
    channel.basic_qos(options.prefetch).await?;
    let deliveries = channel
        .basic_consume(&info.name, &options.consumer_tag)
        .await?;

    tracing::info!(
        queue = %info.name,
        exchange,
        key,
        prefetch = options.prefetch,
        "subscribed"
    );

    let stop = Arc::new(Notify::new());
    let task = tokio::spawn(delivery_loop::<_, T, _>(
        channel,
        info.name.clone(),
        deliveries,
        handler,
        Arc::clone(&stop),
    ));

    Ok(Subscription {
        queue: info.name,
        stop,
        task,
    })
}

async fn delivery_loop<Ch, T, H>(
    channel: Ch,
    queue: String,
    mut deliveries: DeliveryStream<Ch::Delivery>,
    handler: H,
    stop: Arc<Notify>,
) where
    Ch: Channel,
    T: Message,
    H: Handler<T>,
{
    loop {
        let next = tokio::select! {
            _ = stop.notified() => break,
            next = deliveries.next() => next,
        };
        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(err)) => {
                tracing::error!(%queue, %err, "delivery stream failed");
                break;
            }
            None => {
                tracing::warn!(%queue, "consumer cancelled by the broker");
                break;
            }
        };

        let decision = match T::decode(delivery.data()) {
            Ok(message) => match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
                Ok(decision) => decision,
                Err(_) => {
                    tracing::error!(%queue, "handler panicked, discarding message");
                    AckDecision::DiscardPermanently
                }
            },
            Err(err) => {
                tracing::warn!(
                    %queue,
                    routing_key = delivery.routing_key(),
                    %err,
                    "undecodable message, discarding"
                );
                AckDecision::DiscardPermanently
            }
        };

        match settle(&delivery, decision).await {
            Ok(()) => tracing::debug!(
                %queue,
                routing_key = delivery.routing_key(),
                decision = decision.as_str(),
                "settled"
            ),
            Err(err) => tracing::warn!(
                %queue,
                %err,
                decision = decision.as_str(),
                "failed to settle delivery"
            ),
        }
    }

    if let Err(err) = channel.close().await {
        tracing::debug!(%queue, %err, "closing subscription channel failed");
    }
    tracing::info!(%queue, "subscription ended");
}

async fn settle<D: Delivery>(delivery: &D, decision: AckDecision) -> Result<(), BrokerError> {
    match decision {
        AckDecision::Ack => delivery.ack().await,
        AckDecision::RequeueAndRetry => delivery.nack(true).await,
        AckDecision::DiscardPermanently => delivery.nack(false).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SubscribeOptions::default();
        assert_eq!(options.prefetch, 10);
        assert!(options.consumer_tag.is_empty());
    }

    #[test]
    fn test_option_builders() {
        let options = SubscribeOptions::default()
            .with_prefetch(1)
            .with_consumer_tag("alice-moves");
        assert_eq!(options.prefetch, 1);
        assert_eq!(options.consumer_tag, "alice-moves");
    }

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let handler = |n: u32| async move {
            if n % 2 == 0 {
                AckDecision::Ack
            } else {
                AckDecision::RequeueAndRetry
            }
        };
        assert_eq!(Handler::<u32>::handle(&handler, 2).await, AckDecision::Ack);
        assert_eq!(
            Handler::<u32>::handle(&handler, 3).await,
            AckDecision::RequeueAndRetry
        );
    }
}
