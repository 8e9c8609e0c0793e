//! # Peril
//!
//! A multiplayer war game played over a message broker.
//!
//! Every player runs a [`PerilClient`] holding its own army. Moves are
//! broadcast on a topic exchange; a player whose units share a location
//! with the mover declares war, and both sides resolve the fight from the
//! same snapshots. A [`PerilServer`] pauses and resumes the game and
//! collects game logs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peril::prelude::*;
//!
//! # async fn run() -> Result<(), PerilError> {
//! let config = PerilConfig::from_env()?;
//! let conn = AmqpConnection::connect(&config.broker_url).await?;
//! let client = PerilClient::join(conn, "alice", &config).await?;
//! let unit = client.spawn(Location::Europe, UnitRank::Infantry).await;
//! client.move_units(Location::Asia, &[unit.id]).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod server;
mod sink;

pub use client::{PerilClient, SPAM_QUOTES};
pub use config::{DEFAULT_BROKER_URL, ENV_BROKER_URL, ENV_PREFETCH, PerilConfig};
pub use error::PerilError;
pub use server::PerilServer;
pub use sink::{FileSink, GameLogSink, TracingSink};

pub mod prelude {
    //! Common imports for building on Peril.

    #[cfg(feature = "amqp")]
    pub use peril_broker::AmqpConnection;
    #[cfg(feature = "memory")]
    pub use peril_broker::MemoryBroker;
    pub use peril_broker::Connection;
    pub use peril_game::{GameState, Status, WarOutcome, WarReport};
    pub use peril_protocol::{ArmyMove, GameLog, Location, Player, Unit, UnitRank};

    pub use crate::{FileSink, GameLogSink, PerilClient, PerilConfig, PerilError, PerilServer, TracingSink};
}
