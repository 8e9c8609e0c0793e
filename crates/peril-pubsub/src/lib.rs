//! Messaging layer for Peril.
//!
//! Sits between the broker seam ([`peril_broker`]) and game logic:
//!
//! - **Topology** ([`declare_and_bind`], [`declare_exchange`]): exchange
//!   and queue lifecycle with dead-letter wiring.
//! - **Publishing** ([`publish`], [`Publisher`]): encode and send once.
//! - **Subscribing** ([`subscribe`]): one delivery loop per queue that
//!   decodes, calls a [`Handler`], and settles by its [`AckDecision`].

mod ack;
mod error;
mod publish;
mod subscribe;
mod topology;

pub use ack::AckDecision;
pub use error::PubSubError;
pub use publish::{Publisher, publish};
pub use subscribe::{DEFAULT_PREFETCH, Handler, SubscribeOptions, Subscription, subscribe};
pub use topology::{
    QueueDurability, dead_letter_arguments, declare_and_bind, declare_exchange,
    declare_peril_exchanges,
};
