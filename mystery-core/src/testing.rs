//! Testing utilities.
//!
//! - [`MockModel`]: a scripted [`ChatModel`] for deterministic tests without
//!   API calls.
//! - [`RecordingProgress`]: a [`ProgressSink`] that keeps every update.
//! - [`TestHarness`]: a ready-made game over the built-in scenario.
//! - Assertion helpers for verifying game state.

use crate::agents::{GameMaster, TurnError, TurnResponse};
use crate::llm::{ChatModel, ChatTurn, LlmError, ModelError};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::scenario::{builtin_pack, KnowledgePack};
use crate::state::GameState;
use crate::voice::NullVoice;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A scripted model: replies are consumed in push order.
///
/// Free-text and structured calls draw from separate queues. Running out of
/// free-text replies yields a harmless stock answer; running out of
/// structured replies is an error, since structured callers always assert on
/// content.
#[derive(Default)]
pub struct MockModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    structured: Mutex<VecDeque<Result<serde_json::Value, String>>>,
    calls: AtomicUsize,
    structured_calls: AtomicUsize,
    systems: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a free-text reply.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.lock_replies().push_back(Ok(text.into()));
    }

    /// Queue a free-text failure.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.lock_replies().push_back(Err(message.into()));
    }

    /// Queue a structured reply.
    pub fn push_structured(&self, value: serde_json::Value) {
        self.lock_structured().push_back(Ok(value));
    }

    /// Queue a structured failure.
    pub fn fail_next_structured(&self, message: impl Into<String>) {
        self.lock_structured().push_back(Err(message.into()));
    }

    /// Number of free-text calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of structured calls made so far.
    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    /// The system prompt of the most recent call of either kind.
    pub fn last_system(&self) -> Option<String> {
        self.systems
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_structured(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<serde_json::Value, String>>> {
        self.structured.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_system(&self, system: &str) {
        self.systems
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(system.to_string());
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn complete(
        &self,
        system: &str,
        _history: &[ChatTurn],
        _user: &str,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.record_system(system);
        match self.lock_replies().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ModelError::Api {
                status: 500,
                message,
            }),
            None => Ok("I have nothing more to say.".to_string()),
        }
    }

    async fn complete_structured(
        &self,
        system: &str,
        _user: &str,
        schema_name: &str,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.record_system(system);
        match self.lock_structured().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(LlmError::Model(ModelError::Api {
                status: 500,
                message,
            })),
            None => Err(LlmError::Model(ModelError::BadResponse(format!(
                "no scripted structured reply for '{schema_name}'"
            )))),
        }
    }
}

/// A progress sink that records every update it receives.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn publish(&self, update: ProgressUpdate) {
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(update);
    }
}

/// A running game over a scripted model, for integration tests.
pub struct TestHarness {
    pub model: Arc<MockModel>,
    pub master: GameMaster,
    game_id: String,
}

impl TestHarness {
    /// A fresh game over the built-in scenario.
    pub fn new() -> Self {
        Self::with_pack(builtin_pack())
    }

    pub fn with_pack(pack: KnowledgePack) -> Self {
        let model = Arc::new(MockModel::new());
        let master = GameMaster::new(
            pack,
            Arc::clone(&model) as Arc<dyn ChatModel>,
            Arc::new(NullVoice),
        )
        .expect("test pack must validate");
        let game_id = "test-game".to_string();
        master.initialize_game(&game_id);
        Self {
            model,
            master,
            game_id,
        }
    }

    /// Queue the next character reply.
    pub fn expect_reply(&self, text: impl Into<String>) -> &Self {
        self.model.push_reply(text);
        self
    }

    /// Interrogate a character.
    pub async fn ask(
        &self,
        character_id: &str,
        message: &str,
    ) -> Result<TurnResponse, TurnError> {
        self.master
            .take_turn(&self.game_id, character_id, message, None)
            .await
    }

    /// Snapshot of the game's stored state.
    pub async fn state(&self) -> GameState {
        self.master
            .state_snapshot(&self.game_id)
            .await
            .expect("harness game always exists")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the history has exactly `expected` entries.
#[track_caller]
pub fn assert_history_len(state: &GameState, expected: usize) {
    assert_eq!(
        state.message_history.len(),
        expected,
        "Expected {expected} history entries, got {}",
        state.message_history.len()
    );
}

/// Assert some revealed clue contains `fragment`.
#[track_caller]
pub fn assert_clue_revealed(state: &GameState, fragment: &str) {
    assert!(
        state.revealed_clues.iter().any(|c| c.contains(fragment)),
        "Expected a revealed clue containing '{fragment}', got {:?}",
        state.revealed_clues
    );
}

/// Assert a character's stress level, with float tolerance.
#[track_caller]
pub fn assert_stress(state: &GameState, character_id: &str, expected: f32) {
    let actual = state.dynamic_state(character_id).stress_level;
    assert!(
        (actual - expected).abs() < 1e-5,
        "Expected stress {expected} for '{character_id}', got {actual}"
    );
}
