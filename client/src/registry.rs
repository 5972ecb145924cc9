//! Last-known state of every remote player.
//!
//! The sync engine is the only writer; the render side reads snapshots at its
//! own cadence. Readers share the lock with each other, writers take it
//! exclusively. Upserts never remove entries. Removal happens only through an
//! [`EvictionPolicy`], which defaults to keeping everyone forever.

use log::info;
use parking_lot::RwLock;
use shared::TickOrdering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Position of a player as last reported.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GameState {
    pub position_x: f64,
    pub position_y: f64,
}

impl GameState {
    pub fn new(position_x: f64, position_y: f64) -> Self {
        Self {
            position_x,
            position_y,
        }
    }

    /// Per-axis midpoint between `self` and `other`.
    pub fn midpoint(&self, other: &GameState) -> GameState {
        GameState {
            position_x: (self.position_x + other.position_x) / 2.0,
            position_y: (self.position_y + other.position_y) / 2.0,
        }
    }
}

/// A registry entry with the bookkeeping eviction policies look at.
#[derive(Debug, Clone)]
pub struct PlayerEntry {
    pub state: GameState,
    /// Tick of the update that produced `state`.
    pub last_tick: u16,
    pub last_seen: Instant,
}

/// Decides which entries [`PlayerRegistry::evict`] drops.
pub trait EvictionPolicy: Send + Sync {
    fn should_evict(&self, entry: &PlayerEntry, now: Instant) -> bool;
}

/// Keeps every entry for the lifetime of the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvict;

impl EvictionPolicy for NeverEvict {
    fn should_evict(&self, _entry: &PlayerEntry, _now: Instant) -> bool {
        false
    }
}

/// Drops players that have not sent an update for longer than the timeout.
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeout(pub Duration);

impl EvictionPolicy for IdleTimeout {
    fn should_evict(&self, entry: &PlayerEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_seen) > self.0
    }
}

pub struct PlayerRegistry {
    players: RwLock<HashMap<String, PlayerEntry>>,
    eviction: Box<dyn EvictionPolicy>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::with_eviction(Box::new(NeverEvict))
    }

    /// Registry that drops entries according to `eviction`.
    pub fn with_eviction(eviction: Box<dyn EvictionPolicy>) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            eviction,
        }
    }

    /// Inserts or overwrites the entry for `identity`.
    pub fn upsert(&self, identity: &str, state: GameState) {
        self.upsert_with_tick(identity, 0, state);
    }

    /// Inserts or overwrites the entry for `identity`, recording its tick.
    pub fn upsert_with_tick(&self, identity: &str, tick: u16, state: GameState) {
        let entry = PlayerEntry {
            state,
            last_tick: tick,
            last_seen: Instant::now(),
        };

        let mut players = self.players.write();
        if players.insert(identity.to_string(), entry).is_none() {
            info!("New player {} at ({:.1}, {:.1})", identity, state.position_x, state.position_y);
        }
    }

    /// Applies the update only if `tick` is fresh against the entry's last
    /// tick. A first sighting is always accepted. Returns whether the update
    /// was applied.
    pub fn upsert_if_fresh(
        &self,
        identity: &str,
        tick: u16,
        state: GameState,
        ordering: TickOrdering,
    ) -> bool {
        let mut players = self.players.write();
        match players.get_mut(identity) {
            Some(entry) => {
                if !ordering.is_fresh(tick, entry.last_tick) {
                    return false;
                }
                entry.state = state;
                entry.last_tick = tick;
                entry.last_seen = Instant::now();
            }
            None => {
                info!(
                    "New player {} at ({:.1}, {:.1})",
                    identity, state.position_x, state.position_y
                );
                players.insert(
                    identity.to_string(),
                    PlayerEntry {
                        state,
                        last_tick: tick,
                        last_seen: Instant::now(),
                    },
                );
            }
        }
        true
    }

    /// Current position of `identity`, if known.
    pub fn get(&self, identity: &str) -> Option<GameState> {
        self.players.read().get(identity).map(|entry| entry.state)
    }

    /// All known players sorted by identity.
    pub fn snapshot(&self) -> Vec<(String, GameState)> {
        let mut players: Vec<(String, GameState)> = self
            .players
            .read()
            .iter()
            .map(|(identity, entry)| (identity.clone(), entry.state))
            .collect();
        players.sort_by(|a, b| a.0.cmp(&b.0));
        players
    }

    /// Removes every entry the eviction policy rejects at `now` and returns
    /// the removed identities.
    pub fn evict(&self, now: Instant) -> Vec<String> {
        let mut players = self.players.write();
        let expired: Vec<String> = players
            .iter()
            .filter(|(_, entry)| self.eviction.should_evict(entry, now))
            .map(|(identity, _)| identity.clone())
            .collect();

        for identity in &expired {
            players.remove(identity);
            info!("Evicted player {}", identity);
        }

        expired
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
