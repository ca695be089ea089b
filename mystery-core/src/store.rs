//! In-memory game-state store with per-game mutual exclusion.
//!
//! The coordinator owns one store and is its sole mutator. Each game's
//! state sits behind its own async mutex: turns within one game are
//! strictly sequential, while games never contend with each other.
//! Everything here is memory-resident and lost on process shutdown.

use crate::state::GameState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Handle to one game's lockable state.
pub type GameSlot = Arc<Mutex<GameState>>;

/// Process-wide map from game id to game state.
#[derive(Default)]
pub struct GameStateStore {
    slots: StdMutex<HashMap<String, GameSlot>>,
}

impl GameStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) the state for a game and return its slot.
    pub fn create(&self, state: GameState) -> GameSlot {
        let slot = Arc::new(Mutex::new(state.clone()));
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(state.game_id.clone(), Arc::clone(&slot));
        slot
    }

    /// The slot for a game, if it exists.
    pub fn get(&self, game_id: &str) -> Option<GameSlot> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(game_id).cloned()
    }

    /// The slot for a game, creating fresh state via `init` if absent.
    pub fn get_or_create(&self, game_id: &str, init: impl FnOnce() -> GameState) -> GameSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(game_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(init())))
            .clone()
    }

    /// A snapshot of the current state for a game.
    pub async fn snapshot(&self, game_id: &str) -> Option<GameState> {
        let slot = self.get(game_id)?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    /// Drop a game's state. Returns whether anything was removed.
    pub fn remove(&self, game_id: &str) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(game_id).is_some()
    }

    pub fn contains(&self, game_id: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.contains_key(game_id)
    }

    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
