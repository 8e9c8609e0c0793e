//! Move detection and war resolution.
//!
//! Every process that sees an [`ArmyMove`] checks it against its own
//! army. If the two share a location, that process declares war by
//! publishing a [`RecognitionOfWar`] holding both snapshots. The outcome
//! is a pure function of those snapshots, so the attacker and defender
//! each compute it independently and agree on who lost units.

use peril_protocol::{ArmyMove, Location, Player, RecognitionOfWar, Unit, UnitRank};

use crate::GameState;

/// Strength of one unit.
pub fn unit_power(rank: UnitRank) -> u32 {
    match rank {
        UnitRank::Artillery => 10,
        UnitRank::Cavalry => 5,
        UnitRank::Infantry => 1,
    }
}

/// Total strength of a group of units.
pub fn power_level<'a>(units: impl IntoIterator<Item = &'a Unit>) -> u32 {
    units.into_iter().map(|unit| unit_power(unit.rank)).sum()
}

/// Where `attacker` and `defender` meet, if anywhere.
///
/// Returns the location of the attacker's lowest-ID unit that shares a
/// location with any defender unit.
pub fn overlapping_location(attacker: &Player, defender: &Player) -> Option<Location> {
    attacker
        .units
        .values()
        .find(|unit| defender.units.values().any(|other| other.location == unit.location))
        .map(|unit| unit.location)
}

/// One side of a war.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Attacker,
    Defender,
}

/// The numbers behind a war's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Battle {
    pub location: Location,
    pub attacker_power: u32,
    pub defender_power: u32,
}

impl Battle {
    /// The stronger side, or `None` on a draw.
    pub fn winner(&self) -> Option<Side> {
        match self.attacker_power.cmp(&self.defender_power) {
            std::cmp::Ordering::Greater => Some(Side::Attacker),
            std::cmp::Ordering::Less => Some(Side::Defender),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Computes the battle described by `war`, or `None` if the snapshots no
/// longer share a location.
pub fn fight(war: &RecognitionOfWar) -> Option<Battle> {
    let location = overlapping_location(&war.attacker, &war.defender)?;
    Some(Battle {
        location,
        attacker_power: power_level(war.attacker.units_at(location)),
        defender_power: power_level(war.defender.units_at(location)),
    })
}

/// What a received [`ArmyMove`] means for the local player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Our own move, echoed back.
    SamePlayer,
    /// No shared location with the mover.
    Safe,
    /// The mover is now at war with us; publish this declaration.
    MakeWar(RecognitionOfWar),
}

/// How a war ended, from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarOutcome {
    /// The war is between other players, or this process already
    /// resolved it when declaring.
    NotInvolved,
    /// The snapshots no longer overlap; nothing to fight over.
    NoUnits,
    YouWon,
    OpponentWon,
    Draw,
}

/// The result of resolving a war, for the caller and the game log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarReport {
    pub outcome: WarOutcome,
    pub attacker: String,
    pub defender: String,
    pub battle: Option<Battle>,
    /// Local units destroyed by this war.
    pub units_lost: Vec<Unit>,
}

impl WarReport {
    fn unresolved(outcome: WarOutcome, war: &RecognitionOfWar) -> Self {
        Self {
            outcome,
            attacker: war.attacker.username.clone(),
            defender: war.defender.username.clone(),
            battle: None,
            units_lost: Vec::new(),
        }
    }

    /// `(winner, loser)` usernames, unless the war was a draw or not fought.
    pub fn winner_and_loser(&self) -> Option<(&str, &str)> {
        match self.battle?.winner()? {
            Side::Attacker => Some((self.attacker.as_str(), self.defender.as_str())),
            Side::Defender => Some((self.defender.as_str(), self.attacker.as_str())),
        }
    }

    /// The game-log line for a fought war.
    pub fn log_message(&self) -> Option<String> {
        match self.outcome {
            WarOutcome::YouWon | WarOutcome::OpponentWon => self
                .winner_and_loser()
                .map(|(winner, loser)| format!("{winner} won a war against {loser}")),
            WarOutcome::Draw => Some(format!(
                "A war between {} and {} resulted in a draw",
                self.attacker, self.defender
            )),
            WarOutcome::NotInvolved | WarOutcome::NoUnits => None,
        }
    }
}

impl GameState {
    /// Checks another player's move against the local army.
    ///
    /// On overlap the returned declaration names the mover as attacker and
    /// carries the local snapshot the overlap was found in.
    pub async fn handle_move(&self, mv: &ArmyMove) -> MoveOutcome {
        if mv.player.username == self.username() {
            return MoveOutcome::SamePlayer;
        }

        let local = self.snapshot().await;
        match overlapping_location(&mv.player, &local) {
            Some(location) => {
                tracing::info!(
                    username = self.username(),
                    attacker = %mv.player.username,
                    %location,
                    "enemy units in contact, declaring war"
                );
                MoveOutcome::MakeWar(RecognitionOfWar {
                    attacker: mv.player.clone(),
                    defender: local,
                })
            }
            None => {
                tracing::debug!(username = self.username(), mover = %mv.player.username, "safe from move");
                MoveOutcome::Safe
            }
        }
    }

    /// Resolves a war received from the shared war queue.
    ///
    /// Only the attacker resolves here; the defender already did so when
    /// it declared, so both get [`WarOutcome::NotInvolved`] along with
    /// everyone else.
    pub async fn handle_war(&self, war: &RecognitionOfWar) -> WarReport {
        if war.defender.username == self.username() || war.attacker.username != self.username() {
            return WarReport::unresolved(WarOutcome::NotInvolved, war);
        }
        self.resolve(war, Side::Attacker).await
    }

    /// Resolves the defender's side of a war this process just declared.
    pub async fn resolve_declared_war(&self, war: &RecognitionOfWar) -> WarReport {
        if war.defender.username != self.username() {
            return WarReport::unresolved(WarOutcome::NotInvolved, war);
        }
        self.resolve(war, Side::Defender).await
    }

    async fn resolve(&self, war: &RecognitionOfWar, local: Side) -> WarReport {
        let Some(battle) = fight(war) else {
            tracing::warn!(
                attacker = %war.attacker.username,
                defender = %war.defender.username,
                "no units in the same location, no war fought"
            );
            return WarReport::unresolved(WarOutcome::NoUnits, war);
        };

        let outcome = match battle.winner() {
            Some(winner) if winner == local => WarOutcome::YouWon,
            Some(_) => WarOutcome::OpponentWon,
            None => WarOutcome::Draw,
        };
        let units_lost = match outcome {
            WarOutcome::YouWon => Vec::new(),
            _ => self.remove_units_at(battle.location).await,
        };

        tracing::info!(
            username = self.username(),
            attacker = %war.attacker.username,
            defender = %war.defender.username,
            location = %battle.location,
            attacker_power = battle.attacker_power,
            defender_power = battle.defender_power,
            ?outcome,
            "war resolved"
        );

        WarReport {
            outcome,
            attacker: war.attacker.username.clone(),
            defender: war.defender.username.clone(),
            battle: Some(battle),
            units_lost,
        }
    }
}
