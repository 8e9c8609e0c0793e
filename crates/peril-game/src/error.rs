//! Error types for the game layer.

/// Errors returned to whoever issued a game command.
///
/// These never reach the broker: a rejected command publishes nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Units can't move while the server has the game paused.
    #[error("the game is paused, you can not move units")]
    Paused,

    /// A move must name at least one unit.
    #[error("a move needs at least one unit id")]
    EmptyMove,

    /// The player has no unit with this ID.
    #[error("unit with id {0} not found")]
    UnknownUnit(u32),
}
