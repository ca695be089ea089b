//! Per-game mutable state: message history, per-character dynamic state,
//! and revealed clues.
//!
//! A [`GameState`] is created from a [`KnowledgePack`](crate::scenario::KnowledgePack)
//! when a game starts, lives in memory for the life of the process, and is
//! mutated only by character-agent invocations and the coordinator's
//! request-preparation step.

use crate::scenario::KnowledgePack;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Player,
    Character,
}

/// One entry in the append-only message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub speaker: Speaker,
    /// Set for character entries; `None` for player entries.
    pub character_id: Option<String>,
    pub text: String,
    /// Synthesized speech for this entry, when voice is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl MessageEntry {
    /// A plain player message.
    pub fn player(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Player,
            character_id: None,
            text: text.into(),
            audio: None,
            voice_id: None,
        }
    }

    /// A character's reply.
    pub fn character(character_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Character,
            character_id: Some(character_id.into()),
            text: text.into(),
            audio: None,
            voice_id: None,
        }
    }
}

/// Dynamic state for one character within one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicState {
    /// In `[0, 1]`; monotone non-decreasing across invocations.
    pub stress_level: f32,
    pub interrogation_count: u32,
    pub lies_told: u32,
    pub last_topics: Vec<String>,
}

impl Default for DynamicState {
    fn default() -> Self {
        Self {
            stress_level: 0.0,
            interrogation_count: 0,
            lies_told: 0,
            last_topics: Vec::new(),
        }
    }
}

/// The complete mutable record of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: String,

    /// Append-only; never reordered.
    pub message_history: Vec<MessageEntry>,

    /// character id -> dynamic state. Every key exists in the pack.
    pub character_states: HashMap<String, DynamicState>,

    /// Ordered, deduplicated clue descriptions. Never shrinks.
    pub revealed_clues: Vec<String>,

    // Per-request transients, overwritten each turn.
    pub current_player_message: String,
    pub selected_character_id: String,
    pub final_response: String,
    pub responding_character_id: String,
    pub detected_clue: Option<String>,
}

impl GameState {
    /// Fresh state for a game started from the given pack: empty history,
    /// zeroed dynamic state for every character, no clues.
    pub fn new(game_id: impl Into<String>, pack: &KnowledgePack) -> Self {
        let character_states = pack
            .characters
            .iter()
            .map(|c| (c.id.clone(), DynamicState::default()))
            .collect();

        Self {
            game_id: game_id.into(),
            message_history: Vec::new(),
            character_states,
            revealed_clues: Vec::new(),
            current_player_message: String::new(),
            selected_character_id: String::new(),
            final_response: String::new(),
            responding_character_id: String::new(),
            detected_clue: None,
        }
    }

    /// Dynamic state for a character, zeroed if never touched.
    pub fn dynamic_state(&self, character_id: &str) -> DynamicState {
        self.character_states
            .get(character_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Record a clue unless the exact string is already present.
    pub fn record_clue(&mut self, clue: impl Into<String>) {
        let clue = clue.into();
        if !self.revealed_clues.contains(&clue) {
            self.revealed_clues.push(clue);
        }
    }
}
