//! Integration tests for the war protocol, played out between several
//! `GameState`s without a broker in between.

use peril_game::{GameState, MoveOutcome, WarOutcome};
use peril_protocol::{Location, RecognitionOfWar, UnitRank};

// =========================================================================
// Helpers
// =========================================================================

/// Has `defender` observe `mover`'s move of `ids` to `to`, expecting war.
async fn declare(
    mover: &GameState,
    defender: &GameState,
    to: Location,
    ids: &[u32],
) -> RecognitionOfWar {
    let mv = mover.move_units(to, ids).await.expect("move should succeed");
    match defender.handle_move(&mv).await {
        MoveOutcome::MakeWar(war) => war,
        other => panic!("expected war, got {other:?}"),
    }
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test]
async fn test_europe_scenario_defender_wins() {
    let alice = GameState::new("alice");
    let bob = GameState::new("bob");

    let a1 = alice.spawn_unit(Location::Europe, UnitRank::Infantry).await;
    let b1 = bob.spawn_unit(Location::Europe, UnitRank::Artillery).await;
    assert_eq!(a1.id, 1);
    assert_eq!(b1.id, 1);

    let war = declare(&alice, &bob, Location::Europe, &[a1.id]).await;
    assert_eq!(war.attacker.username, "alice");
    assert_eq!(war.defender.username, "bob");

    let bob_report = bob.resolve_declared_war(&war).await;
    assert_eq!(bob_report.outcome, WarOutcome::YouWon);
    assert!(bob_report.units_lost.is_empty());

    let alice_report = alice.handle_war(&war).await;
    assert_eq!(alice_report.outcome, WarOutcome::OpponentWon);
    assert_eq!(alice_report.units_lost, vec![a1]);
    assert!(alice.snapshot().await.units.is_empty());
    assert_eq!(bob.unit(b1.id).await, Some(b1));

    // Both sides report the same battle.
    assert_eq!(alice_report.battle, bob_report.battle);
    assert_eq!(
        alice_report.log_message().as_deref(),
        Some("bob won a war against alice")
    );
}

#[tokio::test]
async fn test_attacker_wins_and_keeps_units() {
    let alice = GameState::new("alice");
    let bob = GameState::new("bob");

    alice.spawn_unit(Location::Asia, UnitRank::Artillery).await;
    alice.spawn_unit(Location::Asia, UnitRank::Cavalry).await;
    alice.spawn_unit(Location::Asia, UnitRank::Infantry).await;
    bob.spawn_unit(Location::Europe, UnitRank::Cavalry).await;
    let bob_far = bob.spawn_unit(Location::Africa, UnitRank::Infantry).await;

    let war = declare(&alice, &bob, Location::Europe, &[1, 2, 3]).await;

    let alice_report = alice.handle_war(&war).await;
    let battle = alice_report.battle.expect("war was fought");
    assert_eq!(battle.attacker_power, 16);
    assert_eq!(battle.defender_power, 5);
    assert_eq!(alice_report.outcome, WarOutcome::YouWon);
    assert_eq!(alice.snapshot().await.units.len(), 3);

    let bob_report = bob.resolve_declared_war(&war).await;
    assert_eq!(bob_report.outcome, WarOutcome::OpponentWon);
    assert_eq!(bob_report.units_lost.len(), 1);
    // Units away from the contested location survive.
    assert_eq!(bob.snapshot().await.units.len(), 1);
    assert_eq!(bob.unit(bob_far.id).await, Some(bob_far));
}

#[tokio::test]
async fn test_draw_removes_both_sides() {
    let alice = GameState::new("alice");
    let bob = GameState::new("bob");

    alice.spawn_unit(Location::Americas, UnitRank::Cavalry).await;
    bob.spawn_unit(Location::Europe, UnitRank::Infantry).await;
    bob.spawn_unit(Location::Europe, UnitRank::Infantry).await;
    bob.spawn_unit(Location::Europe, UnitRank::Infantry).await;
    bob.spawn_unit(Location::Europe, UnitRank::Infantry).await;
    bob.spawn_unit(Location::Europe, UnitRank::Infantry).await;

    let war = declare(&alice, &bob, Location::Europe, &[1]).await;

    let alice_report = alice.handle_war(&war).await;
    let bob_report = bob.resolve_declared_war(&war).await;
    assert_eq!(alice_report.outcome, WarOutcome::Draw);
    assert_eq!(bob_report.outcome, WarOutcome::Draw);
    assert!(alice.snapshot().await.units.is_empty());
    assert!(bob.snapshot().await.units.is_empty());
    assert_eq!(
        alice_report.log_message().as_deref(),
        Some("A war between alice and bob resulted in a draw")
    );
}

#[tokio::test]
async fn test_bystanders_and_defender_are_not_involved_on_receipt() {
    let alice = GameState::new("alice");
    let bob = GameState::new("bob");
    let carol = GameState::new("carol");

    alice.spawn_unit(Location::Asia, UnitRank::Infantry).await;
    bob.spawn_unit(Location::Asia, UnitRank::Infantry).await;
    carol.spawn_unit(Location::Asia, UnitRank::Artillery).await;

    let war = declare(&alice, &bob, Location::Asia, &[1]).await;

    assert_eq!(bob.handle_war(&war).await.outcome, WarOutcome::NotInvolved);
    assert_eq!(carol.handle_war(&war).await.outcome, WarOutcome::NotInvolved);
    assert_eq!(
        carol.resolve_declared_war(&war).await.outcome,
        WarOutcome::NotInvolved
    );
    // Nobody lost anything by looking.
    assert_eq!(bob.snapshot().await.units.len(), 1);
    assert_eq!(carol.snapshot().await.units.len(), 1);
}

#[tokio::test]
async fn test_own_move_and_safe_move() {
    let alice = GameState::new("alice");
    let bob = GameState::new("bob");

    alice.spawn_unit(Location::Asia, UnitRank::Infantry).await;
    bob.spawn_unit(Location::Europe, UnitRank::Infantry).await;

    let mv = alice.move_units(Location::Africa, &[1]).await.unwrap();
    assert_eq!(alice.handle_move(&mv).await, MoveOutcome::SamePlayer);
    assert_eq!(bob.handle_move(&mv).await, MoveOutcome::Safe);
}

#[tokio::test]
async fn test_war_without_overlap_is_no_units() {
    let alice = GameState::new("alice");
    let bob = GameState::new("bob");

    alice.spawn_unit(Location::Asia, UnitRank::Infantry).await;
    bob.spawn_unit(Location::Europe, UnitRank::Infantry).await;

    let war = RecognitionOfWar {
        attacker: alice.snapshot().await,
        defender: bob.snapshot().await,
    };
    let report = alice.handle_war(&war).await;
    assert_eq!(report.outcome, WarOutcome::NoUnits);
    assert_eq!(report.log_message(), None);
    assert_eq!(alice.snapshot().await.units.len(), 1);
}
