//! Game rules for Peril.
//!
//! - [`GameState`]: the local player's army and pause flag, behind a
//!   `tokio` read/write lock.
//! - [`war`]: overlap detection, power levels, and the outcome of a war
//!   as seen by each side.
//!
//! Nothing here talks to the broker; the caller publishes the events these
//! functions return.

mod error;
mod state;
pub mod war;

pub use error::GameError;
pub use state::{GameState, Status};
pub use war::{Battle, MoveOutcome, Side, WarOutcome, WarReport, power_level};
