//! The in-process game service.
//!
//! One `GameService` owns every running game: it builds coordinators from
//! built-in, caller-provided, or freshly generated scenarios, holds them in
//! an explicit per-game map, and exposes the operations a transport layer
//! would translate one-to-one into endpoints.

use crate::agents::{
    CharacterDebugInfo, GameInfo, GameMaster, PersonaInfo, StateDebugInfo, TurnError, TurnResponse,
};
use crate::generator::{Difficulty, GenerationError, ScenarioGenerator};
use crate::image::{DisabledIllustrator, SceneIllustrator, SceneImage};
use crate::llm::ChatModel;
use crate::progress::{NullProgress, ProgressReporter, ProgressSink};
use crate::prompts::TemplateLibrary;
use crate::scenario::{builtin_pack, ConfigurationError, KnowledgePack, Solution};
use crate::state::MessageEntry;
use crate::voice::{NullVoice, SpeechSynthesizer, VoicePools};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// A fresh unique game id, for callers that do not bring their own.
pub fn new_game_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Errors surfaced by the service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown game '{0}'")]
    UnknownGame(String),

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Everything a caller needs to present a freshly started game.
#[derive(Debug)]
pub struct StartedGame {
    pub game_id: String,
    pub info: GameInfo,
    pub images: Vec<SceneImage>,
}

/// Assembles a [`GameService`] from its collaborators.
pub struct GameServiceBuilder {
    model: Arc<dyn ChatModel>,
    generator_model: Arc<dyn ChatModel>,
    voice: Arc<dyn SpeechSynthesizer>,
    illustrator: Arc<dyn SceneIllustrator>,
    progress: Arc<dyn ProgressSink>,
    templates: TemplateLibrary,
    pools: VoicePools,
}

impl GameServiceBuilder {
    /// `model` answers in-character dialogue; `generator_model` writes
    /// scenarios (typically a higher temperature).
    pub fn new(model: Arc<dyn ChatModel>, generator_model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            generator_model,
            voice: Arc::new(NullVoice),
            illustrator: Arc::new(DisabledIllustrator),
            progress: Arc::new(NullProgress),
            templates: TemplateLibrary::embedded_only(),
            pools: VoicePools::default(),
        }
    }

    pub fn voice(mut self, voice: Arc<dyn SpeechSynthesizer>) -> Self {
        self.voice = voice;
        self
    }

    pub fn illustrator(mut self, illustrator: Arc<dyn SceneIllustrator>) -> Self {
        self.illustrator = illustrator;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn templates(mut self, templates: TemplateLibrary) -> Self {
        self.templates = templates;
        self
    }

    pub fn voice_pools(mut self, pools: VoicePools) -> Self {
        self.pools = pools;
        self
    }

    pub fn build(self) -> GameService {
        GameService {
            generator: ScenarioGenerator::with_templates(
                self.generator_model,
                self.templates.clone(),
            ),
            model: self.model,
            voice: self.voice,
            illustrator: self.illustrator,
            progress: self.progress,
            templates: self.templates,
            pools: self.pools,
            games: Mutex::new(HashMap::new()),
        }
    }
}

/// The running service: per-game coordinators behind a lock.
pub struct GameService {
    model: Arc<dyn ChatModel>,
    generator: ScenarioGenerator,
    voice: Arc<dyn SpeechSynthesizer>,
    illustrator: Arc<dyn SceneIllustrator>,
    progress: Arc<dyn ProgressSink>,
    templates: TemplateLibrary,
    pools: VoicePools,
    games: Mutex<HashMap<String, Arc<GameMaster>>>,
}

impl GameService {
    pub fn builder(
        model: Arc<dyn ChatModel>,
        generator_model: Arc<dyn ChatModel>,
    ) -> GameServiceBuilder {
        GameServiceBuilder::new(model, generator_model)
    }

    fn build_master(&self, pack: KnowledgePack) -> Result<Arc<GameMaster>, ConfigurationError> {
        Ok(Arc::new(GameMaster::with_collaborators(
            pack,
            Arc::clone(&self.model),
            Arc::clone(&self.voice),
            self.templates.clone(),
            &self.pools,
            None,
        )?))
    }

    fn install(&self, game_id: &str, master: Arc<GameMaster>) {
        master.initialize_game(game_id);
        let mut games = self.games.lock().unwrap_or_else(|e| e.into_inner());
        games.insert(game_id.to_string(), master);
    }

    fn master(&self, game_id: &str) -> Result<Arc<GameMaster>, ServiceError> {
        let games = self.games.lock().unwrap_or_else(|e| e.into_inner());
        games
            .get(game_id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownGame(game_id.to_string()))
    }

    /// Start a game from the built-in scenario.
    pub async fn start_default(&self, game_id: &str) -> Result<StartedGame, ServiceError> {
        self.quick_start(game_id, builtin_pack()).await
    }

    /// Start a game from a caller-provided pack. No generation round trip.
    pub async fn quick_start(
        &self,
        game_id: &str,
        pack: KnowledgePack,
    ) -> Result<StartedGame, ServiceError> {
        tracing::info!(game = %game_id, case = %pack.name, "quick-starting game");
        let master = self.build_master(pack)?;
        let info = master.game_info();
        self.install(game_id, master);
        Ok(StartedGame {
            game_id: game_id.to_string(),
            info,
            images: Vec::new(),
        })
    }

    /// Generate a scenario and start a game from it, publishing staged
    /// progress along the way. All-or-nothing: a failed generation or an
    /// invalid pack leaves no game behind.
    pub async fn generate_and_start(
        &self,
        game_id: &str,
        user_input: &str,
        difficulty: Difficulty,
        max_retries: u32,
    ) -> Result<StartedGame, ServiceError> {
        let reporter = ProgressReporter::new(self.progress.as_ref(), game_id);
        reporter.started().await;

        let result = self
            .generate_and_start_inner(game_id, user_input, difficulty, max_retries, &reporter)
            .await;
        if let Err(err) = &result {
            reporter.error(&err.to_string()).await;
        }
        result
    }

    async fn generate_and_start_inner(
        &self,
        game_id: &str,
        user_input: &str,
        difficulty: Difficulty,
        max_retries: u32,
        reporter: &ProgressReporter<'_>,
    ) -> Result<StartedGame, ServiceError> {
        let pack = self
            .generator
            .generate_with_progress(
                user_input,
                difficulty,
                max_retries,
                self.progress.as_ref(),
                game_id,
            )
            .await?;

        reporter.generating_images().await;
        let images = self.illustrator.generate_images(&pack).await;

        reporter.initializing_game().await;
        let master = self.build_master(pack)?;
        let info = master.game_info();
        self.install(game_id, master);

        reporter.complete().await;
        Ok(StartedGame {
            game_id: game_id.to_string(),
            info,
            images,
        })
    }

    /// One interrogation turn against a running game.
    pub async fn chat(
        &self,
        game_id: &str,
        character_id: &str,
        message: &str,
        history: Option<Vec<MessageEntry>>,
    ) -> Result<TurnResponse, ServiceError> {
        let master = self.master(game_id)?;
        Ok(master
            .take_turn(game_id, character_id, message, history)
            .await?)
    }

    pub fn personas(&self, game_id: &str) -> Result<Vec<PersonaInfo>, ServiceError> {
        Ok(self.master(game_id)?.game_info().characters)
    }

    pub fn game_info(&self, game_id: &str) -> Result<GameInfo, ServiceError> {
        Ok(self.master(game_id)?.game_info())
    }

    pub fn character_debug(
        &self,
        game_id: &str,
        character_id: &str,
    ) -> Result<Option<CharacterDebugInfo>, ServiceError> {
        Ok(self.master(game_id)?.character_debug(character_id))
    }

    pub fn characters_debug(&self, game_id: &str) -> Result<Vec<CharacterDebugInfo>, ServiceError> {
        Ok(self.master(game_id)?.characters_debug())
    }

    pub async fn state_debug(&self, game_id: &str) -> Result<Option<StateDebugInfo>, ServiceError> {
        Ok(self.master(game_id)?.state_debug(game_id).await)
    }

    pub fn solution(&self, game_id: &str) -> Result<Solution, ServiceError> {
        Ok(self.master(game_id)?.solution().clone())
    }

    pub fn graph_mermaid(&self, game_id: &str) -> Result<String, ServiceError> {
        Ok(self.master(game_id)?.graph_mermaid())
    }

    /// Drop a game and its coordinator. Returns whether it existed.
    pub fn remove_game(&self, game_id: &str) -> bool {
        let mut games = self.games.lock().unwrap_or_else(|e| e.into_inner());
        match games.remove(game_id) {
            Some(master) => {
                master.remove_game(game_id);
                tracing::info!(game = %game_id, "game removed");
                true
            }
            None => false,
        }
    }

    pub fn game_count(&self) -> usize {
        self.games.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Stage;
    use crate::testing::{MockModel, RecordingProgress};

    fn service(model: Arc<MockModel>) -> GameService {
        GameService::builder(Arc::clone(&model) as Arc<dyn ChatModel>, model).build()
    }

    #[tokio::test]
    async fn test_default_start_and_chat() {
        let model = Arc::new(MockModel::new());
        model.push_reply("I left the office at six.");
        let service = service(Arc::clone(&model));

        let started = service.start_default("g1").await.unwrap();
        assert_eq!(started.info.case_name, "The InnoTech Case");
        assert_eq!(started.info.characters.len(), 4);

        let turn = service
            .chat("g1", "elena", "When did you leave?", None)
            .await
            .unwrap();
        assert_eq!(turn.character_id, "elena");
        assert_eq!(turn.reply, "I left the office at six.");
    }

    #[tokio::test]
    async fn test_chat_against_unknown_game() {
        let model = Arc::new(MockModel::new());
        let service = service(Arc::clone(&model));

        let err = service.chat("ghost", "elena", "Hello?", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownGame(id) if id == "ghost"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_quick_start_rejects_invalid_pack() {
        let service = service(Arc::new(MockModel::new()));
        let mut pack = builtin_pack();
        pack.characters.truncate(3);

        let err = service.quick_start("g1", pack).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Config(ConfigurationError::TooFewCharacters(3))
        ));
        assert_eq!(service.game_count(), 0);
    }

    #[tokio::test]
    async fn test_games_are_isolated() {
        let model = Arc::new(MockModel::new());
        model.push_reply("Answer one.");
        let service = service(Arc::clone(&model));

        let g1 = new_game_id();
        let g2 = new_game_id();
        assert_ne!(g1, g2);
        service.start_default(&g1).await.unwrap();
        service.start_default(&g2).await.unwrap();
        service.chat(&g1, "klaus", "See anything?", None).await.unwrap();

        let first = service.state_debug(&g1).await.unwrap().unwrap();
        let second = service.state_debug(&g2).await.unwrap().unwrap();
        assert_eq!(first.message_count, 2);
        assert_eq!(second.message_count, 0);
    }

    #[tokio::test]
    async fn test_remove_game() {
        let service = service(Arc::new(MockModel::new()));
        service.start_default("g1").await.unwrap();

        assert!(service.remove_game("g1"));
        assert!(!service.remove_game("g1"));
        assert!(matches!(
            service.personas("g1"),
            Err(ServiceError::UnknownGame(_))
        ));
    }

    #[tokio::test]
    async fn test_generation_failure_reports_error_stage() {
        let model = Arc::new(MockModel::new());
        model.fail_next_structured("rate limited");
        let progress = Arc::new(RecordingProgress::new());
        let service = GameService::builder(Arc::clone(&model) as Arc<dyn ChatModel>, model)
            .progress(Arc::clone(&progress) as Arc<dyn ProgressSink>)
            .build();

        let err = service
            .generate_and_start("g1", "", Difficulty::Medium, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Generation(_)));
        assert_eq!(service.game_count(), 0);

        let stages: Vec<Stage> = progress.updates().iter().map(|u| u.stage).collect();
        assert_eq!(stages.first(), Some(&Stage::Started));
        assert_eq!(stages.last(), Some(&Stage::Error));
    }

    #[tokio::test]
    async fn test_solution_view() {
        let service = service(Arc::new(MockModel::new()));
        service.start_default("g1").await.unwrap();

        let solution = service.solution("g1").unwrap();
        assert_eq!(solution.murderer_id, "tom");
        assert!(!solution.critical_clues.is_empty());
    }
}
