//! Subscription handlers: what each Peril queue does with a delivery.
//!
//! Handlers only decide; the delivery loop in `peril-pubsub` settles the
//! message according to the returned [`AckDecision`].

use std::sync::Arc;

use peril_broker::Channel;
use peril_game::{GameState, MoveOutcome, WarOutcome, WarReport};
use peril_protocol::routing::{EXCHANGE_PERIL_TOPIC, game_log_key, war_key};
use peril_protocol::{ArmyMove, GameLog, PlayingState, RecognitionOfWar};
use peril_pubsub::{AckDecision, Handler, Publisher};
use tokio::sync::mpsc;

use crate::sink::GameLogSink;

/// Where resolved wars are reported to the embedding application.
pub(crate) type ReportSender = mpsc::UnboundedSender<WarReport>;

/// Applies pause/resume broadcasts to the local game.
pub(crate) fn pause_handler(state: Arc<GameState>) -> impl Handler<PlayingState> {
    move |playing: PlayingState| {
        let state = Arc::clone(&state);
        async move {
            if playing.is_paused {
                state.pause().await;
            } else {
                state.resume().await;
            }
            AckDecision::Ack
        }
    }
}

/// Checks every player's moves against the local army.
///
/// On contact the local player declares war on the shared war queue and
/// resolves its own side from the snapshots it just published. The move
/// is only acked once the declaration is out.
pub(crate) fn move_handler<Ch: Channel>(
    state: Arc<GameState>,
    publisher: Publisher<Ch>,
    reports: ReportSender,
) -> impl Handler<ArmyMove> {
    move |mv: ArmyMove| {
        let state = Arc::clone(&state);
        let publisher = publisher.clone();
        let reports = reports.clone();
        async move {
            let war = match state.handle_move(&mv).await {
                MoveOutcome::SamePlayer | MoveOutcome::Safe => return AckDecision::Ack,
                MoveOutcome::MakeWar(war) => war,
            };

            let key = war_key(state.username());
            if let Err(err) = publisher.publish(EXCHANGE_PERIL_TOPIC, &key, &war).await {
                tracing::warn!(username = state.username(), %err, "failed to declare war, retrying move");
                return AckDecision::RequeueAndRetry;
            }

            let report = state.resolve_declared_war(&war).await;
            let _ = reports.send(report);
            AckDecision::Ack
        }
    }
}

/// Resolves wars in which the local player is the attacker.
///
/// Everyone else's wars go back on the queue for their attacker to pick
/// up. A war without a contested location can never be fought and is
/// discarded.
pub(crate) fn war_handler<Ch: Channel>(
    state: Arc<GameState>,
    publisher: Publisher<Ch>,
    reports: ReportSender,
) -> impl Handler<RecognitionOfWar> {
    move |war: RecognitionOfWar| {
        let state = Arc::clone(&state);
        let publisher = publisher.clone();
        let reports = reports.clone();
        async move {
            let report = state.handle_war(&war).await;
            match report.outcome {
                WarOutcome::NotInvolved => return AckDecision::RequeueAndRetry,
                WarOutcome::NoUnits => return AckDecision::DiscardPermanently,
                WarOutcome::YouWon | WarOutcome::OpponentWon | WarOutcome::Draw => {}
            }

            if let Some(message) = report.log_message() {
                let log = GameLog::new(state.username(), message);
                let key = game_log_key(state.username());
                if let Err(err) = publisher.publish(EXCHANGE_PERIL_TOPIC, &key, &log).await {
                    tracing::warn!(username = state.username(), %err, "failed to publish game log, retrying war");
                    return AckDecision::RequeueAndRetry;
                }
            }

            let _ = reports.send(report);
            AckDecision::Ack
        }
    }
}

/// Hands game logs to `sink`, requeueing any the sink fails to take.
pub(crate) fn game_log_handler<S: GameLogSink>(sink: Arc<S>) -> impl Handler<GameLog> {
    move |log: GameLog| {
        let sink = Arc::clone(&sink);
        async move {
            match sink.write(&log).await {
                Ok(()) => AckDecision::Ack,
                Err(err) => {
                    tracing::warn!(username = %log.username, %err, "game log not written, requeueing");
                    AckDecision::RequeueAndRetry
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peril_protocol::{Location, UnitRank};

    #[tokio::test]
    async fn test_pause_handler_flips_state() {
        let state = Arc::new(GameState::new("alice"));
        let handler = pause_handler(Arc::clone(&state));

        let decision = handler.handle(PlayingState { is_paused: true }).await;
        assert_eq!(decision, AckDecision::Ack);
        assert!(state.is_paused().await);

        handler.handle(PlayingState { is_paused: false }).await;
        assert!(!state.is_paused().await);
    }

    #[tokio::test]
    async fn test_game_log_handler_requeues_on_sink_failure() {
        struct FailingSink;

        impl GameLogSink for FailingSink {
            async fn write(&self, _: &GameLog) -> Result<(), crate::PerilError> {
                Err(crate::PerilError::Config("disk full".into()))
            }
        }

        let handler = game_log_handler(Arc::new(FailingSink));
        let decision = handler.handle(GameLog::new("alice", "hello")).await;
        assert_eq!(decision, AckDecision::RequeueAndRetry);
    }

    #[tokio::test]
    async fn test_war_handler_requeues_other_players_wars() {
        let broker = peril_broker::MemoryBroker::new();
        let conn = broker.connect();
        let publisher = Publisher::open(&conn).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let carol = Arc::new(GameState::new("carol"));
        carol.spawn_unit(Location::Asia, UnitRank::Infantry).await;
        let handler = war_handler(Arc::clone(&carol), publisher, tx);

        let alice = GameState::new("alice");
        let bob = GameState::new("bob");
        alice.spawn_unit(Location::Asia, UnitRank::Infantry).await;
        bob.spawn_unit(Location::Asia, UnitRank::Infantry).await;
        let war = RecognitionOfWar {
            attacker: alice.snapshot().await,
            defender: bob.snapshot().await,
        };

        assert_eq!(handler.handle(war).await, AckDecision::RequeueAndRetry);
        assert!(rx.try_recv().is_err());
        assert_eq!(carol.snapshot().await.units.len(), 1);
    }
}
