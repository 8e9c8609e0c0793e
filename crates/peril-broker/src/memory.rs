//! In-process broker with AMQP 0-9-1 routing and acknowledgment semantics.
//!
//! [`MemoryBroker`] keeps exchanges, queues and bindings in a shared table.
//! Each consumer is fed through a `flume` channel, so a [`DeliveryStream`]
//! from this backend behaves like one from RabbitMQ: messages are handed
//! out round-robin within the prefetch window, stay unacknowledged until
//! settled, and return to the queue when their channel closes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;

use crate::{
    BrokerError, Channel, Connection, ConnectionId, Delivery, DeliveryStream, ExchangeKind,
    QueueArguments, QueueInfo, QueueOptions, topic_matches,
};

type SharedState = Arc<Mutex<BrokerState>>;

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Message {
    routing_key: String,
    content_type: String,
    payload: Vec<u8>,
    redelivered: bool,
}

/// Open/closed flags of a channel and its connection.
#[derive(Debug, Clone)]
struct Liveness {
    connection: Arc<AtomicBool>,
    channel: Arc<AtomicBool>,
}

impl Liveness {
    fn is_open(&self) -> bool {
        self.connection.load(Ordering::Acquire) && self.channel.load(Ordering::Acquire)
    }
}

struct Consumer {
    id: u64,
    tag: String,
    channel: u64,
    connection: ConnectionId,
    prefetch: u16,
    in_flight: usize,
    liveness: Liveness,
    sender: flume::Sender<MemoryDelivery>,
}

impl Consumer {
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.in_flight < usize::from(self.prefetch)
    }
}

struct Pending {
    consumer: u64,
    message: Message,
}

struct QueueState {
    options: QueueOptions,
    arguments: QueueArguments,
    owner: Option<ConnectionId>,
    ready: VecDeque<Message>,
    unacked: BTreeMap<u64, Pending>,
    consumers: Vec<Consumer>,
    cursor: usize,
}

impl QueueState {
    fn new(options: QueueOptions, arguments: QueueArguments, owner: Option<ConnectionId>) -> Self {
        Self {
            options,
            arguments,
            owner,
            ready: VecDeque::new(),
            unacked: BTreeMap::new(),
            consumers: Vec::new(),
            cursor: 0,
        }
    }

    fn locked_by_other(&self, connection: ConnectionId) -> bool {
        matches!(self.owner, Some(owner) if owner != connection)
    }

    fn info(&self, name: &str) -> QueueInfo {
        QueueInfo {
            name: name.to_string(),
            message_count: u32::try_from(self.ready.len()).unwrap_or(u32::MAX),
            consumer_count: u32::try_from(self.consumers.len()).unwrap_or(u32::MAX),
        }
    }
}

struct Binding {
    exchange: String,
    queue: String,
    routing_key: String,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeKind>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    next_id: u64,
}

impl BrokerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn delete_queue(&mut self, name: &str) -> Option<QueueState> {
        self.bindings.retain(|binding| binding.queue != name);
        let removed = self.queues.remove(name);
        if removed.is_some() {
            tracing::debug!(queue = name, "queue deleted");
        }
        removed
    }
}

/// Hands ready messages to consumers with spare prefetch capacity.
fn dispatch(shared: &SharedState, state: &mut BrokerState, queue: &str) {
    let mut lost_consumer = false;
    let Some(q) = state.queues.get_mut(queue) else {
        return;
    };

    while !q.ready.is_empty() {
        let count = q.consumers.len();
        let Some(index) = (0..count)
            .map(|offset| (q.cursor + offset) % count)
            .find(|&i| q.consumers[i].has_capacity())
        else {
            break;
        };
        let Some(message) = q.ready.pop_front() else {
            break;
        };
        q.cursor = (index + 1) % count;
        state.next_id += 1;
        let delivery_tag = state.next_id;

        let consumer = &mut q.consumers[index];
        let delivery = MemoryDelivery {
            state: Arc::clone(shared),
            liveness: consumer.liveness.clone(),
            queue: queue.to_string(),
            delivery_tag,
            message: message.clone(),
        };

        if consumer.sender.send(delivery).is_ok() {
            consumer.in_flight += 1;
            q.unacked.insert(
                delivery_tag,
                Pending {
                    consumer: consumer.id,
                    message,
                },
            );
        } else {
            tracing::debug!(queue, consumer = %consumer.tag, "consumer stream dropped, cancelling");
            q.consumers.remove(index);
            q.ready.push_front(message);
            lost_consumer = true;
        }
    }

    if lost_consumer && q.consumers.is_empty() && q.options.auto_delete {
        state.delete_queue(queue);
    }
}

/// Routes `message` through `exchange` using its routing key.
fn route(
    shared: &SharedState,
    state: &mut BrokerState,
    exchange: &str,
    message: Message,
) -> Result<(), BrokerError> {
    let routing_key = message.routing_key.as_str();
    let targets: Vec<String> = if exchange.is_empty() {
        // Default exchange: routes by queue name.
        state
            .queues
            .contains_key(routing_key)
            .then(|| routing_key.to_string())
            .into_iter()
            .collect()
    } else {
        let kind = state
            .exchanges
            .get(exchange)
            .copied()
            .ok_or_else(|| BrokerError::NotFound(format!("no exchange '{exchange}'")))?;

        let mut targets: Vec<String> = Vec::new();
        for binding in state.bindings.iter().filter(|b| b.exchange == exchange) {
            let matched = match kind {
                ExchangeKind::Direct => binding.routing_key == routing_key,
                ExchangeKind::Topic => topic_matches(&binding.routing_key, routing_key),
            };
            if matched && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }
        targets
    };

    if targets.is_empty() {
        tracing::trace!(exchange, routing_key, "unroutable message dropped");
    }

    for name in targets {
        if let Some(q) = state.queues.get_mut(&name) {
            q.ready.push_back(message.clone());
        }
        dispatch(shared, state, &name);
    }
    Ok(())
}

/// Removes every consumer matching `cancel`, returning its unacknowledged
/// messages to the front of their queues.
fn cancel_consumers(shared: &SharedState, state: &mut BrokerState, cancel: impl Fn(&Consumer) -> bool) {
    let names: Vec<String> = state.queues.keys().cloned().collect();
    for name in names {
        let Some(q) = state.queues.get_mut(&name) else {
            continue;
        };
        let removed: Vec<u64> = q.consumers.iter().filter(|c| cancel(c)).map(|c| c.id).collect();
        if removed.is_empty() {
            continue;
        }
        q.consumers.retain(|c| !removed.contains(&c.id));

        let tags: Vec<u64> = q
            .unacked
            .iter()
            .filter(|(_, pending)| removed.contains(&pending.consumer))
            .map(|(tag, _)| *tag)
            .collect();
        for tag in tags.into_iter().rev() {
            if let Some(pending) = q.unacked.remove(&tag) {
                let mut message = pending.message;
                message.redelivered = true;
                q.ready.push_front(message);
            }
        }

        if q.consumers.is_empty() && q.options.auto_delete {
            state.delete_queue(&name);
        } else {
            dispatch(shared, state, &name);
        }
    }
}

enum Settlement {
    Ack,
    Requeue,
    Reject,
}

fn settle(
    shared: &SharedState,
    queue: &str,
    delivery_tag: u64,
    settlement: Settlement,
) -> Result<(), BrokerError> {
    let mut guard = lock(shared);
    let state = &mut *guard;

    let q = state
        .queues
        .get_mut(queue)
        .ok_or_else(|| BrokerError::NotFound(format!("no queue '{queue}'")))?;
    let pending = q.unacked.remove(&delivery_tag).ok_or_else(|| {
        BrokerError::PreconditionFailed(format!("unknown delivery tag {delivery_tag}"))
    })?;
    if let Some(consumer) = q.consumers.iter_mut().find(|c| c.id == pending.consumer) {
        consumer.in_flight = consumer.in_flight.saturating_sub(1);
    }

    let dead_letter = match settlement {
        Settlement::Ack => None,
        Settlement::Requeue => {
            let mut message = pending.message;
            message.redelivered = true;
            q.ready.push_front(message);
            None
        }
        Settlement::Reject => q.arguments.dead_letter_exchange.clone().map(|exchange| {
            let mut message = pending.message;
            message.redelivered = false;
            if let Some(key) = &q.arguments.dead_letter_routing_key {
                message.routing_key = key.clone();
            }
            (exchange, message)
        }),
    };

    dispatch(shared, state, queue);

    if let Some((exchange, message)) = dead_letter {
        if let Err(err) = route(shared, state, &exchange, message) {
            tracing::warn!(%err, queue, "dead-letter exchange missing, message dropped");
        }
    }
    Ok(())
}

/// Snapshot of a queue's state, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub name: String,
    pub options: QueueOptions,
    pub arguments: QueueArguments,
    /// Messages waiting for a consumer.
    pub ready: usize,
    /// Messages delivered but not yet settled.
    pub unacked: usize,
    pub consumers: usize,
}

/// An in-process broker. Cloning yields another handle to the same broker.
///
/// `MemoryBroker` implements the slice of AMQP 0-9-1 that Peril relies
/// on, so whole games can run inside one test process:
///
/// - direct and topic exchanges, with `*` and `#` in binding keys
/// - durable, exclusive and auto-delete queues
/// - `x-dead-letter-exchange` routing of rejected messages
/// - per-channel prefetch and round-robin dispatch across consumers
/// - channel-closing errors (404, 405, 406) just like a real broker
///
/// Each [`connect`](Self::connect) returns a separate [`MemoryConnection`],
/// so exclusive queues and connection-close cleanup behave as they would
/// with several processes.
///
/// Unlike a real broker it can be inspected:
/// [`queue_snapshot`](Self::queue_snapshot) shows ready and unacked
/// counts, which is how the tests check where messages ended up.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: SharedState,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connection to this broker.
    pub fn connect(&self) -> MemoryConnection {
        let id = ConnectionId::new(lock(&self.state).next_id());
        tracing::debug!(%id, "memory connection opened");
        MemoryConnection {
            id,
            state: Arc::clone(&self.state),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn queue_snapshot(&self, name: &str) -> Option<QueueSnapshot> {
        let state = lock(&self.state);
        state.queues.get(name).map(|q| QueueSnapshot {
            name: name.to_string(),
            options: q.options,
            arguments: q.arguments.clone(),
            ready: q.ready.len(),
            unacked: q.unacked.len(),
            consumers: q.consumers.len(),
        })
    }

    pub fn exchange_kind(&self, name: &str) -> Option<ExchangeKind> {
        lock(&self.state).exchanges.get(name).copied()
    }

    pub fn has_binding(&self, queue: &str, exchange: &str, routing_key: &str) -> bool {
        lock(&self.state).bindings.iter().any(|b| {
            b.queue == queue && b.exchange == exchange && b.routing_key == routing_key
        })
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBroker").finish_non_exhaustive()
    }
}

/// A connection to a [`MemoryBroker`].
#[derive(Clone)]
pub struct MemoryConnection {
    id: ConnectionId,
    state: SharedState,
    open: Arc<AtomicBool>,
}

impl Connection for MemoryConnection {
    type Channel = MemoryChannel;

    async fn create_channel(&self) -> Result<Self::Channel, BrokerError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(BrokerError::Connection(format!("{} is closed", self.id)));
        }
        let id = lock(&self.state).next_id();
        Ok(MemoryChannel {
            id,
            connection: self.id,
            state: Arc::clone(&self.state),
            liveness: Liveness {
                connection: Arc::clone(&self.open),
                channel: Arc::new(AtomicBool::new(true)),
            },
            prefetch: Arc::new(AtomicU16::new(0)),
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        cancel_consumers(&self.state, state, |c| c.connection == self.id);

        let owned: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, q)| q.owner == Some(self.id))
            .map(|(name, _)| name.clone())
            .collect();
        for name in owned {
            state.delete_queue(&name);
        }
        tracing::debug!(id = %self.id, "memory connection closed");
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// A channel on a [`MemoryConnection`].
///
/// Like an AMQP channel, any channel-level error (`NotFound`,
/// `PreconditionFailed`, `ResourceLocked`) closes it.
#[derive(Clone)]
pub struct MemoryChannel {
    id: u64,
    connection: ConnectionId,
    state: SharedState,
    liveness: Liveness,
    prefetch: Arc<AtomicU16>,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.liveness.is_open() {
            Ok(())
        } else {
            Err(BrokerError::ChannelClosed(format!("channel {} is closed", self.id)))
        }
    }

    /// Closes this channel in response to `err`, then hands `err` back.
    fn fail(&self, state: &mut BrokerState, err: BrokerError) -> BrokerError {
        self.shutdown(state);
        tracing::debug!(channel = self.id, %err, "channel closed by broker");
        err
    }

    fn shutdown(&self, state: &mut BrokerState) {
        self.liveness.channel.store(false, Ordering::Release);
        cancel_consumers(&self.state, state, |c| c.channel == self.id);
    }
}

impl Channel for MemoryChannel {
    type Delivery = MemoryDelivery;

    async fn exchange_declare(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut guard = lock(&self.state);
        match guard.exchanges.get(name).copied() {
            Some(existing) if existing != kind => {
                let err = BrokerError::PreconditionFailed(format!(
                    "exchange '{name}' is {existing}, cannot redeclare as {kind}"
                ));
                Err(self.fail(&mut guard, err))
            }
            Some(_) => Ok(()),
            None => {
                guard.exchanges.insert(name.to_string(), kind);
                tracing::debug!(exchange = name, %kind, "exchange declared");
                Ok(())
            }
        }
    }

    async fn queue_declare(
        &self,
        name: &str,
        options: QueueOptions,
        arguments: &QueueArguments,
    ) -> Result<QueueInfo, BrokerError> {
        self.ensure_open()?;
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let name = if name.is_empty() {
            format!("amq.gen-{}", state.next_id())
        } else {
            name.to_string()
        };

        if let Some(existing) = state.queues.get(&name) {
            let conflict = if existing.locked_by_other(self.connection) {
                Some(BrokerError::ResourceLocked(format!(
                    "queue '{name}' is exclusive to another connection"
                )))
            } else if existing.options != options || existing.arguments != *arguments {
                Some(BrokerError::PreconditionFailed(format!(
                    "inequivalent arguments for queue '{name}'"
                )))
            } else {
                None
            };
            let info = existing.info(&name);
            return match conflict {
                Some(err) => Err(self.fail(state, err)),
                None => Ok(info),
            };
        }

        let owner = options.exclusive.then_some(self.connection);
        let queue = QueueState::new(options, arguments.clone(), owner);
        let info = queue.info(&name);
        state.queues.insert(name.clone(), queue);
        tracing::debug!(
            queue = %name,
            durable = options.durable,
            exclusive = options.exclusive,
            "queue declared"
        );
        Ok(info)
    }

    async fn queue_delete(&self, name: &str) -> Result<u32, BrokerError> {
        self.ensure_open()?;
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        match state.queues.get(name).map(|q| q.locked_by_other(self.connection)) {
            None => return Ok(0),
            Some(true) => {
                let err = BrokerError::ResourceLocked(format!(
                    "queue '{name}' is exclusive to another connection"
                ));
                return Err(self.fail(state, err));
            }
            Some(false) => {}
        }

        let purged = state.delete_queue(name).map_or(0, |q| q.ready.len());
        Ok(u32::try_from(purged).unwrap_or(u32::MAX))
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let problem = match state.queues.get(queue) {
            None => Some(BrokerError::NotFound(format!("no queue '{queue}'"))),
            Some(q) if q.locked_by_other(self.connection) => Some(BrokerError::ResourceLocked(
                format!("queue '{queue}' is exclusive to another connection"),
            )),
            Some(_) if !state.exchanges.contains_key(exchange) => {
                Some(BrokerError::NotFound(format!("no exchange '{exchange}'")))
            }
            Some(_) => None,
        };
        if let Some(err) = problem {
            return Err(self.fail(state, err));
        }

        let exists = state.bindings.iter().any(|b| {
            b.queue == queue && b.exchange == exchange && b.routing_key == routing_key
        });
        if !exists {
            state.bindings.push(Binding {
                exchange: exchange.to_string(),
                queue: queue.to_string(),
                routing_key: routing_key.to_string(),
            });
            tracing::debug!(queue, exchange, routing_key, "queue bound");
        }
        Ok(())
    }

    async fn basic_qos(&self, prefetch_count: u16) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.prefetch.store(prefetch_count, Ordering::Release);
        Ok(())
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let message = Message {
            routing_key: routing_key.to_string(),
            content_type: content_type.to_string(),
            payload: payload.to_vec(),
            redelivered: false,
        };
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        route(&self.state, state, exchange, message).map_err(|err| self.fail(state, err))
    }

    async fn basic_consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream<Self::Delivery>, BrokerError> {
        self.ensure_open()?;
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let problem = match state.queues.get(queue) {
            None => Some(BrokerError::NotFound(format!("no queue '{queue}'"))),
            Some(q) if q.locked_by_other(self.connection) => Some(BrokerError::ResourceLocked(
                format!("queue '{queue}' is exclusive to another connection"),
            )),
            Some(_) => None,
        };
        if let Some(err) = problem {
            return Err(self.fail(state, err));
        }

        let id = state.next_id();
        let tag = if consumer_tag.is_empty() {
            format!("amq.ctag-{id}")
        } else {
            consumer_tag.to_string()
        };
        let (sender, receiver) = flume::unbounded();
        let consumer = Consumer {
            id,
            tag,
            channel: self.id,
            connection: self.connection,
            prefetch: self.prefetch.load(Ordering::Acquire),
            in_flight: 0,
            liveness: self.liveness.clone(),
            sender,
        };
        tracing::debug!(queue, consumer = %consumer.tag, prefetch = consumer.prefetch, "consumer started");
        if let Some(q) = state.queues.get_mut(queue) {
            q.consumers.push(consumer);
        }
        dispatch(&self.state, state, queue);

        Ok(receiver.into_stream().map(Ok).boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.liveness.channel.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut guard = lock(&self.state);
        self.shutdown(&mut guard);
        Ok(())
    }
}

/// A message delivered by a [`MemoryBroker`].
pub struct MemoryDelivery {
    state: SharedState,
    liveness: Liveness,
    queue: String,
    delivery_tag: u64,
    message: Message,
}

impl MemoryDelivery {
    /// The broker-assigned tag identifying this delivery.
    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// The content type the message was published with.
    pub fn content_type(&self) -> &str {
        &self.message.content_type
    }

    /// The queue this delivery came from.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    fn settle(&self, settlement: Settlement) -> Result<(), BrokerError> {
        if !self.liveness.is_open() {
            return Err(BrokerError::ChannelClosed(format!(
                "cannot settle delivery {}: channel closed",
                self.delivery_tag
            )));
        }
        settle(&self.state, &self.queue, self.delivery_tag, settlement)
    }
}

impl fmt::Debug for MemoryDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDelivery")
            .field("queue", &self.queue)
            .field("delivery_tag", &self.delivery_tag)
            .field("routing_key", &self.message.routing_key)
            .field("redelivered", &self.message.redelivered)
            .finish_non_exhaustive()
    }
}

impl Delivery for MemoryDelivery {
    fn data(&self) -> &[u8] {
        &self.message.payload
    }

    fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle(Settlement::Ack)
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        if requeue {
            self.settle(Settlement::Requeue)
        } else {
            self.settle(Settlement::Reject)
        }
    }
}
