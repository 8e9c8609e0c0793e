//! Decoding hand-written payloads, as another process would publish them.

use peril_protocol::{ArmyMove, Location, Message, RecognitionOfWar, UnitRank};

#[test]
fn test_decode_army_move_from_literal_json() {
    let json = br#"{
        "player": {
            "username": "alice",
            "units": {
                "1": { "id": 1, "rank": "infantry", "location": "europe" },
                "2": { "id": 2, "rank": "artillery", "location": "asia" }
            }
        },
        "units": [{ "id": 1, "rank": "infantry", "location": "europe" }],
        "toLocation": "europe"
    }"#;

    let mv = ArmyMove::decode(json).expect("valid army move");
    assert_eq!(mv.player.username, "alice");
    assert_eq!(mv.player.units.len(), 2);
    assert_eq!(mv.player.units[&2].rank, UnitRank::Artillery);
    assert_eq!(mv.to_location, Location::Europe);
    assert_eq!(mv.units[0].id, 1);
}

#[test]
fn test_decode_rejects_unknown_location() {
    let json = br#"{
        "player": { "username": "alice", "units": {} },
        "units": [],
        "toLocation": "atlantis"
    }"#;
    assert!(ArmyMove::decode(json).is_err());
}

#[test]
fn test_recognition_of_war_snapshots_are_independent() {
    let json = br#"{
        "attacker": { "username": "alice", "units": {} },
        "defender": {
            "username": "bob",
            "units": { "7": { "id": 7, "rank": "cavalry", "location": "africa" } }
        }
    }"#;

    let rw = RecognitionOfWar::decode(json).expect("valid recognition");
    assert!(rw.attacker.units.is_empty());
    assert_eq!(rw.defender.units_at(Location::Africa).count(), 1);
}
