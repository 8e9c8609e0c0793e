//! Exchange, queue and routing-key names shared by every Peril process.
//!
//! Per-player keys are `<prefix>.<username>`; consumers bind with
//! `<prefix>.*` on the topic exchange.

/// Direct exchange carrying pause/resume broadcasts.
pub const EXCHANGE_PERIL_DIRECT: &str = "direct-peril";
/// Topic exchange carrying army moves, war recognitions and game logs.
pub const EXCHANGE_PERIL_TOPIC: &str = "topic-peril";
/// Direct exchange receiving permanently rejected durable messages.
pub const EXCHANGE_PERIL_DEAD_LETTER: &str = "dead-letter-peril";
/// Queue collecting dead-lettered messages; also its routing key.
pub const QUEUE_PERIL_DLQ: &str = "peril_dlq";

pub const PAUSE_KEY: &str = "pause";
pub const ARMY_MOVES_PREFIX: &str = "army_moves";
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";
pub const GAME_LOG_SLUG: &str = "game_logs";

/// Shared durable queue for war recognitions.
pub const WAR_QUEUE: &str = WAR_RECOGNITIONS_PREFIX;
/// Shared durable queue for game logs, consumed by the server.
pub const GAME_LOG_QUEUE: &str = GAME_LOG_SLUG;

/// A player's transient pause queue, `pause.<username>`.
pub fn pause_queue(username: &str) -> String {
    format!("{PAUSE_KEY}.{username}")
}

/// Key a player publishes moves under; also their move queue's name.
pub fn army_moves_key(username: &str) -> String {
    format!("{ARMY_MOVES_PREFIX}.{username}")
}

/// Binding that receives every player's moves.
pub fn army_moves_binding() -> String {
    format!("{ARMY_MOVES_PREFIX}.*")
}

pub fn war_key(username: &str) -> String {
    format!("{WAR_RECOGNITIONS_PREFIX}.{username}")
}

pub fn war_binding() -> String {
    format!("{WAR_RECOGNITIONS_PREFIX}.*")
}

pub fn game_log_key(username: &str) -> String {
    format!("{GAME_LOG_SLUG}.{username}")
}

pub fn game_log_binding() -> String {
    format!("{GAME_LOG_SLUG}.*")
}
