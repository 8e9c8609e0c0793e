//! Wire protocol for Peril.
//!
//! This crate defines what travels between Peril processes:
//!
//! - **Types** ([`ArmyMove`], [`RecognitionOfWar`], [`PlayingState`],
//!   [`GameLog`], and the [`Player`]/[`Unit`] snapshots they carry).
//! - **Codecs** ([`Codec`] trait, [`JsonCodec`], [`BincodeCodec`]) and the
//!   [`Message`] trait that fixes each type's encoding.
//! - **Routing** ([`routing`]): exchange, queue and key names.
//! - **Errors** ([`ProtocolError`]).
//!
//! It knows nothing about brokers or game rules.

mod codec;
mod error;
mod message;
pub mod routing;
mod types;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use error::ProtocolError;
pub use message::{Encoding, Message};
pub use types::{
    ArmyMove, GameLog, Location, Player, PlayingState, RecognitionOfWar, Unit, UnitRank,
};
