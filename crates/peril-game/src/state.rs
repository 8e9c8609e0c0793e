//! The local player's game state.

use std::collections::BTreeMap;

use peril_protocol::{ArmyMove, Location, Player, Unit, UnitRank};
use tokio::sync::RwLock;

use crate::GameError;

struct Inner {
    player: Player,
    paused: bool,
    /// Units ever spawned; the next unit gets `spawned + 1`.
    spawned: u32,
}

/// One process's player record and pause flag.
///
/// Shared between the command issuer and every subscription handler,
/// typically as `Arc<GameState>`. Reads (snapshots, status) run
/// concurrently; writes (pause, spawn, move, removal) are exclusive.
pub struct GameState {
    username: String,
    inner: RwLock<Inner>,
}

/// Summary of the local player for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub username: String,
    pub paused: bool,
    /// Units in ID order.
    pub units: Vec<Unit>,
}

impl GameState {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            inner: RwLock::new(Inner {
                player: Player::new(username.clone()),
                paused: false,
                spawned: 0,
            }),
            username,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn pause(&self) {
        self.inner.write().await.paused = true;
        tracing::info!(username = %self.username, "game paused");
    }

    pub async fn resume(&self) {
        self.inner.write().await.paused = false;
        tracing::info!(username = %self.username, "game resumed");
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.read().await.paused
    }

    /// Adds a new unit at `location` and returns it.
    ///
    /// IDs come from a counter that only grows, so a new unit never takes
    /// the ID of one that was moved or destroyed.
    pub async fn spawn_unit(&self, location: Location, rank: UnitRank) -> Unit {
        let mut inner = self.inner.write().await;
        inner.spawned += 1;
        let unit = Unit {
            id: inner.spawned,
            rank,
            location,
        };
        inner.player.units.insert(unit.id, unit);
        tracing::info!(username = %self.username, id = unit.id, %rank, %location, "unit spawned");
        unit
    }

    /// Moves the units in `ids` to `location`.
    ///
    /// Fails without changing anything if the game is paused, `ids` is
    /// empty, or any ID is unknown. Repeated IDs move once. On success
    /// returns the move event, carrying a snapshot taken after the move.
    pub async fn move_units(&self, location: Location, ids: &[u32]) -> Result<ArmyMove, GameError> {
        let mut inner = self.inner.write().await;
        if inner.paused {
            return Err(GameError::Paused);
        }
        if ids.is_empty() {
            return Err(GameError::EmptyMove);
        }

        let mut unique: Vec<u32> = Vec::with_capacity(ids.len());
        for &id in ids {
            if !inner.player.units.contains_key(&id) {
                return Err(GameError::UnknownUnit(id));
            }
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let mut moved = Vec::with_capacity(unique.len());
        for id in unique {
            if let Some(unit) = inner.player.units.get_mut(&id) {
                unit.location = location;
                moved.push(*unit);
            }
        }

        tracing::info!(username = %self.username, count = moved.len(), %location, "units moved");
        Ok(ArmyMove {
            player: inner.player.clone(),
            units: moved,
            to_location: location,
        })
    }

    /// Deletes every local unit at `location`, returning what was removed.
    pub async fn remove_units_at(&self, location: Location) -> Vec<Unit> {
        let mut inner = self.inner.write().await;
        let (removed, kept): (BTreeMap<u32, Unit>, _) = std::mem::take(&mut inner.player.units)
            .into_iter()
            .partition(|(_, unit)| unit.location == location);
        inner.player.units = kept;

        let removed: Vec<Unit> = removed.into_values().collect();
        if !removed.is_empty() {
            tracing::info!(username = %self.username, count = removed.len(), %location, "units destroyed");
        }
        removed
    }

    /// A deep copy of the player record.
    pub async fn snapshot(&self) -> Player {
        self.inner.read().await.player.clone()
    }

    pub async fn unit(&self, id: u32) -> Option<Unit> {
        self.inner.read().await.player.units.get(&id).copied()
    }

    pub async fn status(&self) -> Status {
        let inner = self.inner.read().await;
        Status {
            username: self.username.clone(),
            paused: inner.paused,
            units: inner.player.units.values().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_assigns_increasing_ids() {
        let state = GameState::new("alice");
        let mut last = 0;
        for location in Location::ALL {
            for rank in UnitRank::ALL {
                let unit = state.spawn_unit(location, rank).await;
                assert!(unit.id > last);
                last = unit.id;
            }
        }
        assert_eq!(state.snapshot().await.units.len(), 18);
    }

    #[tokio::test]
    async fn test_spawn_after_removal_does_not_reuse_id() {
        let state = GameState::new("alice");
        state.spawn_unit(Location::Europe, UnitRank::Infantry).await;
        let survivor = state.spawn_unit(Location::Asia, UnitRank::Cavalry).await;
        state.remove_units_at(Location::Europe).await;

        let next = state.spawn_unit(Location::Africa, UnitRank::Artillery).await;
        assert_eq!(next.id, 3);
        assert_eq!(state.unit(survivor.id).await, Some(survivor));
    }

    #[tokio::test]
    async fn test_move_units_while_paused_fails_without_mutation() {
        let state = GameState::new("alice");
        let unit = state.spawn_unit(Location::Europe, UnitRank::Infantry).await;
        state.pause().await;

        let result = state.move_units(Location::Asia, &[unit.id]).await;
        assert_eq!(result, Err(GameError::Paused));
        assert_eq!(state.unit(unit.id).await.unwrap().location, Location::Europe);
    }

    #[tokio::test]
    async fn test_move_units_empty_fails() {
        let state = GameState::new("alice");
        assert_eq!(
            state.move_units(Location::Asia, &[]).await,
            Err(GameError::EmptyMove)
        );
    }

    #[tokio::test]
    async fn test_move_units_unknown_id_moves_nothing() {
        let state = GameState::new("alice");
        let unit = state.spawn_unit(Location::Europe, UnitRank::Infantry).await;

        let result = state.move_units(Location::Asia, &[unit.id, 99]).await;
        assert_eq!(result, Err(GameError::UnknownUnit(99)));
        assert_eq!(state.unit(unit.id).await.unwrap().location, Location::Europe);
    }

    #[tokio::test]
    async fn test_move_units_returns_post_move_snapshot() {
        let state = GameState::new("alice");
        let a = state.spawn_unit(Location::Europe, UnitRank::Infantry).await;
        let b = state.spawn_unit(Location::Africa, UnitRank::Cavalry).await;

        let mv = state
            .move_units(Location::Asia, &[a.id, a.id, b.id])
            .await
            .unwrap();
        assert_eq!(mv.to_location, Location::Asia);
        assert_eq!(mv.units.len(), 2);
        assert!(mv.player.units.values().all(|u| u.location == Location::Asia));
        assert_eq!(mv.player.username, "alice");
    }

    #[tokio::test]
    async fn test_resume_allows_moves_again() {
        let state = GameState::new("alice");
        let unit = state.spawn_unit(Location::Europe, UnitRank::Infantry).await;
        state.pause().await;
        assert!(state.is_paused().await);
        state.resume().await;
        assert!(state.move_units(Location::Asia, &[unit.id]).await.is_ok());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let state = GameState::new("alice");
        state.spawn_unit(Location::Europe, UnitRank::Infantry).await;
        let before = state.snapshot().await;
        state.remove_units_at(Location::Europe).await;
        assert_eq!(before.units.len(), 1);
        assert!(state.snapshot().await.units.is_empty());
    }

    #[tokio::test]
    async fn test_status_lists_units_in_id_order() {
        let state = GameState::new("alice");
        state.spawn_unit(Location::Europe, UnitRank::Infantry).await;
        state.spawn_unit(Location::Asia, UnitRank::Artillery).await;

        let status = state.status().await;
        assert_eq!(status.username, "alice");
        assert!(!status.paused);
        let ids: Vec<u32> = status.units.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
