//! Core protocol types for Peril's wire format.
//!
//! Every type here travels through the broker. Field names are camelCase
//! on the wire; ranks and locations are lowercase strings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Map and units
// ---------------------------------------------------------------------------

/// A region of the world map.
///
/// The set is closed: parsing any other name fails with
/// [`ProtocolError::InvalidLocation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Americas,
    Europe,
    Africa,
    Asia,
    Australia,
    Antarctica,
}

impl Location {
    /// Every location, in map order.
    pub const ALL: [Location; 6] = [
        Location::Americas,
        Location::Europe,
        Location::Africa,
        Location::Asia,
        Location::Australia,
        Location::Antarctica,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Americas => "americas",
            Self::Europe => "europe",
            Self::Africa => "africa",
            Self::Asia => "asia",
            Self::Australia => "australia",
            Self::Antarctica => "antarctica",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|location| location.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidLocation(s.to_string()))
    }
}

/// The kind of a unit, which determines its strength in battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitRank {
    Infantry,
    Cavalry,
    Artillery,
}

impl UnitRank {
    pub const ALL: [UnitRank; 3] = [UnitRank::Infantry, UnitRank::Cavalry, UnitRank::Artillery];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infantry => "infantry",
            Self::Cavalry => "cavalry",
            Self::Artillery => "artillery",
        }
    }
}

impl fmt::Display for UnitRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitRank {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rank| rank.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidRank(s.to_string()))
    }
}

/// A single unit on the map.
///
/// IDs are unique within one player's army, not globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: u32,
    pub rank: UnitRank,
    pub location: Location,
}

/// A player and their army.
///
/// Embedded in events as a point-in-time snapshot. Units are keyed by ID
/// in a `BTreeMap`, so iteration order is the same in every process that
/// decodes the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub username: String,
    pub units: BTreeMap<u32, Unit>,
}

impl Player {
    /// Creates a player with no units.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            units: BTreeMap::new(),
        }
    }

    /// Units stationed at `location`, in ID order.
    pub fn units_at(&self, location: Location) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |unit| unit.location == location)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Broadcast when the server pauses or resumes the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayingState {
    pub is_paused: bool,
}

/// Published by a player after moving units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmyMove {
    /// The mover, as of just after the move.
    pub player: Player,
    /// The units that moved, already at `to_location`.
    pub units: Vec<Unit>,
    pub to_location: Location,
}

/// Published by a player whose units share a location with a mover's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionOfWar {
    pub attacker: Player,
    pub defender: Player,
}

/// A line of game history, written by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameLog {
    pub current_time: DateTime<Utc>,
    pub username: String,
    pub message: String,
}

impl GameLog {
    /// A log entry stamped with the current time.
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            current_time: Utc::now(),
            username: username.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for GameLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.current_time.to_rfc3339(),
            self.username,
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_str_valid() {
        assert_eq!("europe".parse::<Location>().unwrap(), Location::Europe);
        assert_eq!("antarctica".parse::<Location>().unwrap(), Location::Antarctica);
    }

    #[test]
    fn test_location_from_str_invalid() {
        let err = "atlantis".parse::<Location>().unwrap_err();
        assert_eq!(err, ProtocolError::InvalidLocation("atlantis".into()));
    }

    #[test]
    fn test_location_from_str_is_case_sensitive() {
        assert!("Europe".parse::<Location>().is_err());
    }

    #[test]
    fn test_rank_from_str() {
        assert_eq!("artillery".parse::<UnitRank>().unwrap(), UnitRank::Artillery);
        assert_eq!(
            "dragon".parse::<UnitRank>().unwrap_err(),
            ProtocolError::InvalidRank("dragon".into())
        );
    }

    #[test]
    fn test_display_matches_wire_names() {
        for location in Location::ALL {
            let json = serde_json::to_string(&location).unwrap();
            assert_eq!(json, format!("\"{location}\""));
        }
        for rank in UnitRank::ALL {
            let json = serde_json::to_string(&rank).unwrap();
            assert_eq!(json, format!("\"{rank}\""));
        }
    }

    #[test]
    fn test_player_units_at_in_id_order() {
        let mut player = Player::new("alice");
        for (id, location) in [(3, Location::Europe), (1, Location::Europe), (2, Location::Asia)] {
            player.units.insert(
                id,
                Unit {
                    id,
                    rank: UnitRank::Infantry,
                    location,
                },
            );
        }
        let ids: Vec<u32> = player.units_at(Location::Europe).map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_player_json_shape() {
        let mut player = Player::new("bob");
        player.units.insert(
            1,
            Unit {
                id: 1,
                rank: UnitRank::Artillery,
                location: Location::Africa,
            },
        );
        let value = serde_json::to_value(&player).unwrap();
        assert_eq!(value["username"], "bob");
        assert_eq!(value["units"]["1"]["rank"], "artillery");
    }

    #[test]
    fn test_army_move_uses_to_location_field() {
        let mv = ArmyMove {
            player: Player::new("alice"),
            units: vec![],
            to_location: Location::Asia,
        };
        let value = serde_json::to_value(&mv).unwrap();
        assert_eq!(value["toLocation"], "asia");
    }

    #[test]
    fn test_game_log_display() {
        let log = GameLog::new("alice", "hello");
        let line = log.to_string();
        assert!(line.ends_with(" alice: hello"));
    }
}
