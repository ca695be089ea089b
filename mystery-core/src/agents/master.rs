//! The game master: per-game coordination of interrogation turns.
//!
//! A `GameMaster` owns one scenario's cast of agents, the routing graph over
//! them, and the state store for every game played against that scenario. A
//! turn runs against a copy of the stored state and commits only when the
//! whole pass succeeds, so a failed turn leaves no trace.

use super::character::{AgentError, CharacterAgent};
use super::graph::{GraphDescription, RoutingGraph};
use crate::llm::ChatModel;
use crate::prompts::TemplateLibrary;
use crate::scenario::{ConfigurationError, KnowledgePack, Solution};
use crate::state::{DynamicState, GameState, MessageEntry, Speaker};
use crate::store::{GameSlot, GameStateStore};
use crate::voice::{assign_voices, SpeechSynthesizer, VoicePools};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from a single interrogation turn.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The requested character is not in this scenario's cast. Raised
    /// before any state is touched.
    #[error("unknown character '{0}'")]
    UnknownCharacter(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Everything a caller needs to render one completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub reply: String,
    pub character_id: String,
    pub character_name: String,
    pub stress_level: f32,
    pub interrogation_count: u32,
    pub detected_clue: Option<String>,
    pub revealed_clues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

/// Public description of a running scenario (no secrets).
#[derive(Debug, Clone, Serialize)]
pub struct GameInfo {
    pub case_name: String,
    pub setting: String,
    pub victim: String,
    pub intro_message: String,
    pub characters: Vec<PersonaInfo>,
}

/// One interrogatable persona, as shown to the player.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaInfo {
    pub id: String,
    pub name: String,
    pub role: String,
    pub description: String,
}

/// Full-knowledge dump of one character, for debug views only.
#[derive(Debug, Clone, Serialize)]
pub struct CharacterDebugInfo {
    pub id: String,
    pub name: String,
    pub role: String,
    pub personality: String,
    pub private_knowledge: String,
    pub knows_about_others: String,
    pub clue_keywords: Vec<String>,
    pub voice_id: Option<String>,
    pub is_murderer: bool,
}

/// Summary of one game's stored state, for debug views.
#[derive(Debug, Clone, Serialize)]
pub struct StateDebugInfo {
    pub game_id: String,
    pub message_count: usize,
    pub revealed_clues: Vec<String>,
    pub character_states: HashMap<String, DynamicState>,
}

/// Coordinator for one scenario.
pub struct GameMaster {
    pack: Arc<KnowledgePack>,
    agents: Vec<Arc<CharacterAgent>>,
    graph: RoutingGraph,
    store: Arc<GameStateStore>,
}

impl GameMaster {
    /// Build a coordinator with embedded prompt templates and no voices.
    pub fn new(
        pack: KnowledgePack,
        model: Arc<dyn ChatModel>,
        voice: Arc<dyn SpeechSynthesizer>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_collaborators(
            pack,
            model,
            voice,
            TemplateLibrary::embedded_only(),
            &VoicePools::default(),
            None,
        )
    }

    /// Build a coordinator, validating the pack and constructing one agent
    /// per character. `fixed_voices` overrides pool assignment entirely.
    pub fn with_collaborators(
        pack: KnowledgePack,
        model: Arc<dyn ChatModel>,
        voice: Arc<dyn SpeechSynthesizer>,
        templates: TemplateLibrary,
        pools: &VoicePools,
        fixed_voices: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigurationError> {
        pack.validate()?;
        let pack = Arc::new(pack);
        let mut voices = assign_voices(&pack.characters, pools, fixed_voices);

        let agents: Vec<Arc<CharacterAgent>> = pack
            .characters
            .iter()
            .map(|character| {
                Arc::new(CharacterAgent::new(
                    character,
                    Arc::clone(&pack),
                    Arc::clone(&model),
                    Arc::clone(&voice),
                    voices.remove(&character.id),
                    templates.clone(),
                ))
            })
            .collect();

        tracing::info!(
            case = %pack.name,
            characters = agents.len(),
            "game master ready"
        );

        let graph = RoutingGraph::new(agents.clone());
        Ok(Self {
            pack,
            agents,
            graph,
            store: Arc::new(GameStateStore::new()),
        })
    }

    pub fn pack(&self) -> &KnowledgePack {
        &self.pack
    }

    /// Create fresh state for `game_id`, overwriting any existing game.
    pub fn initialize_game(&self, game_id: &str) -> GameSlot {
        tracing::info!(game = %game_id, case = %self.pack.name, "initializing game");
        self.store.create(GameState::new(game_id, &self.pack))
    }

    /// Select the agent for the state's `selected_character_id`.
    pub fn route(&self, state: &GameState) -> Result<Arc<CharacterAgent>, TurnError> {
        self.agents
            .iter()
            .find(|a| a.id() == state.selected_character_id)
            .cloned()
            .ok_or_else(|| TurnError::UnknownCharacter(state.selected_character_id.clone()))
    }

    /// Stage a player message onto `state`.
    ///
    /// Fails on an unknown character before mutating anything. When the
    /// caller supplies `prior_history` it replaces the stored transcript,
    /// so a client that keeps its own transcript stays authoritative.
    pub fn prepare_request(
        &self,
        state: &mut GameState,
        character_id: &str,
        message: &str,
        prior_history: Option<Vec<MessageEntry>>,
    ) -> Result<(), TurnError> {
        if !self.pack.characters.iter().any(|c| c.id == character_id) {
            return Err(TurnError::UnknownCharacter(character_id.to_string()));
        }

        if let Some(history) = prior_history {
            state.message_history = history;
        }
        state.current_player_message = message.to_string();
        state.selected_character_id = character_id.to_string();
        state.final_response.clear();
        state.responding_character_id.clear();
        state.detected_clue = None;
        state.message_history.push(MessageEntry::player(message));
        Ok(())
    }

    /// Run one full interrogation turn.
    ///
    /// The game's slot lock is held for the whole turn, so concurrent turns
    /// against the same game serialize while other games proceed. The turn
    /// operates on a copy of the stored state and commits only on success.
    pub async fn take_turn(
        &self,
        game_id: &str,
        character_id: &str,
        message: &str,
        prior_history: Option<Vec<MessageEntry>>,
    ) -> Result<TurnResponse, TurnError> {
        let slot = self
            .store
            .get_or_create(game_id, || GameState::new(game_id, &self.pack));
        let mut stored = slot.lock().await;

        let mut working = stored.clone();
        self.prepare_request(&mut working, character_id, message, prior_history)?;
        self.graph.run(&mut working).await?;
        *stored = working;

        Ok(self.response_from(&stored))
    }

    fn response_from(&self, state: &GameState) -> TurnResponse {
        let character_id = state.responding_character_id.clone();
        let character_name = self
            .pack
            .character(&character_id)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let dynamic = state.dynamic_state(&character_id);

        // The agent appended the reply entry last; its audio rides along.
        let (audio, voice_id) = state
            .message_history
            .last()
            .filter(|entry| {
                entry.speaker == Speaker::Character
                    && entry.character_id.as_deref() == Some(character_id.as_str())
            })
            .map(|entry| (entry.audio.clone(), entry.voice_id.clone()))
            .unwrap_or((None, None));

        TurnResponse {
            reply: state.final_response.clone(),
            character_id,
            character_name,
            stress_level: dynamic.stress_level,
            interrogation_count: dynamic.interrogation_count,
            detected_clue: state.detected_clue.clone(),
            revealed_clues: state.revealed_clues.clone(),
            audio,
            voice_id,
        }
    }

    /// Public, spoiler-free description of the scenario.
    pub fn game_info(&self) -> GameInfo {
        GameInfo {
            case_name: self.pack.name.clone(),
            setting: self.pack.setting.clone(),
            victim: self.pack.victim_display(),
            intro_message: self.pack.intro_message.clone(),
            characters: self
                .pack
                .characters
                .iter()
                .map(|c| PersonaInfo {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    role: c.role.clone(),
                    description: c.public_description.clone(),
                })
                .collect(),
        }
    }

    /// Full-knowledge dump of one character.
    pub fn character_debug(&self, character_id: &str) -> Option<CharacterDebugInfo> {
        let agent = self.agents.iter().find(|a| a.id() == character_id)?;
        Some(CharacterDebugInfo {
            id: agent.id().to_string(),
            name: agent.name().to_string(),
            role: agent.role().to_string(),
            personality: agent.personality().to_string(),
            private_knowledge: agent.private_knowledge().to_string(),
            knows_about_others: agent.knows_about_others().to_string(),
            clue_keywords: agent.clue_keywords().to_vec(),
            voice_id: agent.voice_id().map(str::to_string),
            is_murderer: agent.id() == self.pack.solution.murderer_id,
        })
    }

    pub fn characters_debug(&self) -> Vec<CharacterDebugInfo> {
        self.agents
            .iter()
            .filter_map(|a| self.character_debug(a.id()))
            .collect()
    }

    /// Summary of one game's state, or `None` if the game does not exist.
    pub async fn state_debug(&self, game_id: &str) -> Option<StateDebugInfo> {
        let state = self.store.snapshot(game_id).await?;
        Some(StateDebugInfo {
            game_id: state.game_id.clone(),
            message_count: state.message_history.len(),
            revealed_clues: state.revealed_clues.clone(),
            character_states: state.character_states.clone(),
        })
    }

    pub fn solution(&self) -> &Solution {
        &self.pack.solution
    }

    pub async fn state_snapshot(&self, game_id: &str) -> Option<GameState> {
        self.store.snapshot(game_id).await
    }

    pub fn contains_game(&self, game_id: &str) -> bool {
        self.store.contains(game_id)
    }

    pub fn remove_game(&self, game_id: &str) -> bool {
        self.store.remove(game_id)
    }

    pub fn graph_description(&self) -> GraphDescription {
        self.graph.describe()
    }

    pub fn graph_mermaid(&self) -> String {
        self.graph.mermaid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::builtin_pack;
    use crate::testing::MockModel;
    use crate::voice::NullVoice;

    fn master(model: Arc<MockModel>) -> GameMaster {
        GameMaster::new(builtin_pack(), model, Arc::new(NullVoice)).unwrap()
    }

    #[tokio::test]
    async fn test_turn_appends_two_entries_and_bumps_stress() {
        let model = Arc::new(MockModel::new());
        model.push_reply("I was at my desk all evening.");
        let master = master(Arc::clone(&model));
        master.initialize_game("g1");

        let response = master
            .take_turn("g1", "elena", "Where were you on Sunday?", None)
            .await
            .unwrap();

        assert_eq!(response.character_id, "elena");
        assert_eq!(response.character_name, "Elena Schmidt");
        assert_eq!(response.reply, "I was at my desk all evening.");
        assert!((response.stress_level - 0.1).abs() < 1e-6);
        assert_eq!(response.interrogation_count, 1);
        assert!(response.detected_clue.is_none());

        let state = master.state_snapshot("g1").await.unwrap();
        assert_eq!(state.message_history.len(), 2);
        assert_eq!(state.message_history[0].speaker, Speaker::Player);
        assert_eq!(state.message_history[1].speaker, Speaker::Character);
    }

    #[tokio::test]
    async fn test_turn_detects_clue() {
        let model = Arc::new(MockModel::new());
        model.push_reply("Fine. I went back to the office at 21:15, but only briefly.");
        let master = master(Arc::clone(&model));
        master.initialize_game("g1");

        let response = master
            .take_turn("g1", "tom", "When exactly did you return?", None)
            .await
            .unwrap();

        assert_eq!(
            response.detected_clue.as_deref(),
            Some("Tom Berger mentioned '21:15'")
        );
        assert_eq!(response.revealed_clues, vec!["Tom Berger mentioned '21:15'"]);
    }

    #[tokio::test]
    async fn test_unknown_character_leaves_state_untouched() {
        let model = Arc::new(MockModel::new());
        let master = master(Arc::clone(&model));
        master.initialize_game("g1");
        let before = master.state_snapshot("g1").await.unwrap();

        let err = master
            .take_turn("g1", "agatha", "Hello?", None)
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::UnknownCharacter(id) if id == "agatha"));
        assert_eq!(master.state_snapshot("g1").await.unwrap(), before);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_commits_nothing() {
        let model = Arc::new(MockModel::new());
        model.fail_next("quota exceeded");
        let master = master(Arc::clone(&model));
        master.initialize_game("g1");
        let before = master.state_snapshot("g1").await.unwrap();

        let err = master
            .take_turn("g1", "lisa", "What do you know?", None)
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::Agent(AgentError::Model(_))));
        assert_eq!(master.state_snapshot("g1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_two_turn_investigation() {
        let model = Arc::new(MockModel::new());
        model.push_reply("Marcus and I disagreed, but I would never hurt him.");
        model.push_reply("I came back around 21:15 to fetch my charger.");
        let master = master(Arc::clone(&model));
        master.initialize_game("g1");

        let first = master
            .take_turn("g1", "elena", "Did you argue with Marcus?", None)
            .await
            .unwrap();
        assert!(first.detected_clue.is_none());

        let second = master
            .take_turn("g1", "tom", "Where were you at nine?", None)
            .await
            .unwrap();
        assert_eq!(
            second.detected_clue.as_deref(),
            Some("Tom Berger mentioned '21:15'")
        );

        let state = master.state_snapshot("g1").await.unwrap();
        assert_eq!(state.message_history.len(), 4);
        assert_eq!(state.character_states["elena"].interrogation_count, 1);
        assert_eq!(state.character_states["tom"].interrogation_count, 1);
        assert_eq!(state.revealed_clues.len(), 1);
    }

    #[tokio::test]
    async fn test_turn_creates_game_lazily() {
        let model = Arc::new(MockModel::new());
        model.push_reply("Who are you again?");
        let master = master(Arc::clone(&model));

        assert!(!master.contains_game("fresh"));
        master
            .take_turn("fresh", "klaus", "Did you see anything?", None)
            .await
            .unwrap();
        assert!(master.contains_game("fresh"));
    }

    #[tokio::test]
    async fn test_initialize_overwrites_existing_game() {
        let model = Arc::new(MockModel::new());
        model.push_reply("Nothing unusual.");
        let master = master(Arc::clone(&model));
        master.initialize_game("g1");
        master
            .take_turn("g1", "klaus", "Anything odd that night?", None)
            .await
            .unwrap();

        master.initialize_game("g1");
        let state = master.state_snapshot("g1").await.unwrap();
        assert!(state.message_history.is_empty());
        assert!(state.revealed_clues.is_empty());
    }

    #[tokio::test]
    async fn test_prior_history_replaces_transcript() {
        let model = Arc::new(MockModel::new());
        model.push_reply("As I said, I left at six.");
        let master = master(Arc::clone(&model));
        master.initialize_game("g1");

        let history = vec![
            MessageEntry::player("Let's start over."),
            MessageEntry::character("elena", "Fine."),
        ];
        master
            .take_turn("g1", "elena", "When did you leave?", Some(history))
            .await
            .unwrap();

        let state = master.state_snapshot("g1").await.unwrap();
        assert_eq!(state.message_history.len(), 4);
        assert_eq!(state.message_history[0].text, "Let's start over.");
    }

    #[test]
    fn test_game_info_has_no_secrets() {
        let master = master(Arc::new(MockModel::new()));
        let info = master.game_info();

        assert_eq!(info.case_name, "The InnoTech Case");
        assert_eq!(info.characters.len(), 4);
        let serialized = serde_json::to_string(&info).unwrap();
        assert!(!serialized.contains("murderer"));
        assert!(!serialized.to_lowercase().contains("private"));
    }

    #[test]
    fn test_character_debug_marks_murderer() {
        let master = master(Arc::new(MockModel::new()));

        let tom = master.character_debug("tom").unwrap();
        assert!(tom.is_murderer);
        assert!(!tom.private_knowledge.is_empty());

        let elena = master.character_debug("elena").unwrap();
        assert!(!elena.is_murderer);

        assert!(master.character_debug("agatha").is_none());
    }

    #[tokio::test]
    async fn test_remove_game() {
        let master = master(Arc::new(MockModel::new()));
        master.initialize_game("g1");
        assert!(master.remove_game("g1"));
        assert!(!master.remove_game("g1"));
        assert!(master.state_debug("g1").await.is_none());
    }
}
