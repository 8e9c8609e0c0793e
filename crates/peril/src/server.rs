//! The server role: pause control and the game-log consumer.

use std::sync::Arc;

use peril_broker::{Channel, Connection};
use peril_protocol::PlayingState;
use peril_protocol::routing::{
    EXCHANGE_PERIL_DIRECT, EXCHANGE_PERIL_TOPIC, GAME_LOG_QUEUE, PAUSE_KEY, game_log_binding,
};
use peril_pubsub::{
    Publisher, QueueDurability, SubscribeOptions, Subscription, declare_peril_exchanges, subscribe,
};

use crate::handler::game_log_handler;
use crate::sink::GameLogSink;
use crate::{PerilConfig, PerilError};

/// Broadcasts pause state to every player and collects game logs.
pub struct PerilServer<C: Connection> {
    conn: C,
    config: PerilConfig,
    publisher: Publisher<C::Channel>,
    subscriptions: Vec<Subscription>,
}

impl<C: Connection> PerilServer<C> {
    /// Declares the Peril exchanges on `conn` and opens a publishing
    /// channel.
    pub async fn start(conn: C, config: PerilConfig) -> Result<Self, PerilError> {
        declare_peril_exchanges(&conn).await?;
        let publisher = Publisher::open(&conn).await?;
        tracing::info!(connection = %conn.id(), "peril server started");
        Ok(Self {
            conn,
            config,
            publisher,
            subscriptions: Vec::new(),
        })
    }

    /// Tells every player to stop moving units.
    pub async fn pause(&self) -> Result<(), PerilError> {
        self.broadcast(true).await
    }

    /// Lets players move units again.
    pub async fn resume(&self) -> Result<(), PerilError> {
        self.broadcast(false).await
    }

    async fn broadcast(&self, is_paused: bool) -> Result<(), PerilError> {
        self.publisher
            .publish(EXCHANGE_PERIL_DIRECT, PAUSE_KEY, &PlayingState { is_paused })
            .await?;
        tracing::info!(is_paused, "pause state broadcast");
        Ok(())
    }

    /// Consumes every player's game logs from the shared durable
    /// `game_logs` queue into `sink`. Runs until [`shutdown`](Self::shutdown).
    pub async fn consume_logs<S: GameLogSink>(&mut self, sink: S) -> Result<(), PerilError> {
        let options = SubscribeOptions::default()
            .with_prefetch(self.config.prefetch)
            .with_consumer_tag(self.config.consumer_tag("server", "logs"));
        let subscription = subscribe(
            &self.conn,
            EXCHANGE_PERIL_TOPIC,
            GAME_LOG_QUEUE,
            &game_log_binding(),
            QueueDurability::Durable,
            &options,
            game_log_handler(Arc::new(sink)),
        )
        .await?;
        self.subscriptions.push(subscription);
        Ok(())
    }

    /// `false` once log consumption has stopped on its own.
    pub fn is_consuming(&self) -> bool {
        self.subscriptions.iter().all(|subscription| !subscription.is_finished())
    }

    /// Stops log consumption and closes the connection.
    pub async fn shutdown(self) -> Result<(), PerilError> {
        for subscription in self.subscriptions {
            subscription.shutdown().await;
        }
        self.publisher.channel().close().await?;
        self.conn.close().await?;
        tracing::info!("peril server stopped");
        Ok(())
    }
}
