//! The player role.
//!
//! A [`PerilClient`] owns one broker connection and the local
//! [`GameState`]. Joining subscribes it to three queues:
//!
//! | queue | exchange | binding | durability |
//! |---|---|---|---|
//! | `pause.<username>` | `direct-peril` | `pause` | transient |
//! | `army_moves.<username>` | `topic-peril` | `army_moves.*` | transient |
//! | `war` | `topic-peril` | `war.*` | durable, shared |

use std::sync::Arc;

use peril_broker::{Channel, Connection};
use peril_game::{GameState, Status, WarReport};
use peril_protocol::routing::{
    EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, PAUSE_KEY, WAR_QUEUE, army_moves_binding,
    army_moves_key, game_log_key, pause_queue, war_binding,
};
use peril_protocol::{ArmyMove, GameLog, Location, Unit, UnitRank};
use peril_pubsub::{
    Publisher, QueueDurability, SubscribeOptions, Subscription, declare_peril_exchanges, subscribe,
};
use rand::Rng;
use tokio::sync::mpsc;

use crate::handler::{move_handler, pause_handler, war_handler};
use crate::{PerilConfig, PerilError};

/// Quotes published by [`PerilClient::spam`].
pub const SPAM_QUOTES: [&str; 6] = [
    "Never interrupt your enemy when he is making a mistake.",
    "The hardest thing of all for a soldier is to retreat.",
    "A soldier will fight long and hard for a bit of colored ribbon.",
    "It is well that war is so terrible, otherwise we should grow too fond of it.",
    "The art of war is simple enough. Find out where your enemy is. Get at him as soon as you can. Strike him as hard as you can, and keep moving on.",
    "All warfare is based on deception.",
];

/// A joined player.
pub struct PerilClient<C: Connection> {
    conn: C,
    state: Arc<GameState>,
    publisher: Publisher<C::Channel>,
    subscriptions: Vec<Subscription>,
    reports: mpsc::UnboundedReceiver<WarReport>,
}

impl<C: Connection> PerilClient<C> {
    /// Declares the Peril exchanges and subscribes `username` to its
    /// pause, move and war queues on `conn`.
    pub async fn join(
        conn: C,
        username: impl Into<String>,
        config: &PerilConfig,
    ) -> Result<Self, PerilError> {
        let state = Arc::new(GameState::new(username));
        let username = state.username().to_string();

        declare_peril_exchanges(&conn).await?;
        let publisher = Publisher::open(&conn).await?;
        let (report_tx, reports) = mpsc::unbounded_channel();

        let options = |purpose: &str| {
            SubscribeOptions::default()
                .with_prefetch(config.prefetch)
                .with_consumer_tag(config.consumer_tag(&username, purpose))
        };

        let pause = subscribe(
            &conn,
            EXCHANGE_PERIL_DIRECT,
            &pause_queue(&username),
            PAUSE_KEY,
            QueueDurability::Transient,
            &options("pause"),
            pause_handler(Arc::clone(&state)),
        )
        .await?;

        let moves = subscribe(
            &conn,
            EXCHANGE_PERIL_TOPIC,
            &army_moves_key(&username),
            &army_moves_binding(),
            QueueDurability::Transient,
            &options("moves"),
            move_handler(Arc::clone(&state), publisher.clone(), report_tx.clone()),
        )
        .await?;

        let war = subscribe(
            &conn,
            EXCHANGE_PERIL_TOPIC,
            WAR_QUEUE,
            &war_binding(),
            QueueDurability::Durable,
            &options("war"),
            war_handler(Arc::clone(&state), publisher.clone(), report_tx),
        )
        .await?;

        tracing::info!(%username, connection = %conn.id(), "player joined");

        Ok(Self {
            conn,
            state,
            publisher,
            subscriptions: vec![pause, moves, war],
            reports,
        })
    }

    pub fn username(&self) -> &str {
        self.state.username()
    }

    /// The local game state shared with the subscription handlers.
    pub fn state(&self) -> &Arc<GameState> {
        &self.state
    }

    /// Adds a unit locally. Spawns are not broadcast.
    pub async fn spawn(&self, location: Location, rank: UnitRank) -> Unit {
        self.state.spawn_unit(location, rank).await
    }

    /// Moves units locally and broadcasts the move to every player.
    ///
    /// A rejected move publishes nothing. If the publish fails the local
    /// move stands and the error is returned.
    pub async fn move_units(&self, location: Location, ids: &[u32]) -> Result<ArmyMove, PerilError> {
        let mv = self.state.move_units(location, ids).await?;
        self.publisher
            .publish(EXCHANGE_PERIL_TOPIC, &army_moves_key(self.username()), &mv)
            .await?;
        Ok(mv)
    }

    pub async fn status(&self) -> Status {
        self.state.status().await
    }

    /// Publishes `count` random quotes as this player's game logs.
    pub async fn spam(&self, count: usize) -> Result<(), PerilError> {
        let key = game_log_key(self.username());
        for _ in 0..count {
            let quote = SPAM_QUOTES[rand::rng().random_range(0..SPAM_QUOTES.len())];
            let log = GameLog::new(self.username(), quote);
            self.publisher.publish(EXCHANGE_PERIL_TOPIC, &key, &log).await?;
        }
        tracing::info!(username = self.username(), count, "spam published");
        Ok(())
    }

    /// Reports for every war this player fought, as the handlers resolve
    /// them.
    pub fn war_reports(&mut self) -> &mut mpsc::UnboundedReceiver<WarReport> {
        &mut self.reports
    }

    /// `false` once any of the player's subscriptions has stopped
    /// consuming. The player no longer sees game events from that queue
    /// and should leave the game.
    pub fn is_consuming(&self) -> bool {
        self.subscriptions.iter().all(|subscription| !subscription.is_finished())
    }

    /// Stops every subscription, then closes the connection. The
    /// player's transient queues go with it.
    pub async fn shutdown(self) -> Result<(), PerilError> {
        for subscription in self.subscriptions {
            subscription.shutdown().await;
        }
        self.publisher.channel().close().await?;
        self.conn.close().await?;
        tracing::info!(username = self.state.username(), "player left");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spam_quotes_are_distinct() {
        for (i, quote) in SPAM_QUOTES.iter().enumerate() {
            assert!(!quote.is_empty());
            assert!(!SPAM_QUOTES[i + 1..].contains(quote));
        }
    }
}
