//! Multi-agent murder mystery engine.
//!
//! This crate provides:
//! - Knowledge packs: immutable case definitions with a hidden solution
//! - A two-phase AI scenario generator with concurrent persona fan-out
//! - Per-suspect interrogation agents with stress and accidental clue reveals
//! - A game master coordinating turns over an in-memory state store
//! - Optional voice synthesis and crime scene imagery
//!
//! # Quick Start
//!
//! ```ignore
//! use mystery_core::{GameService, OpenAiChat};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = openai::OpenAi::from_env()?;
//!     let agents = Arc::new(OpenAiChat::new(client.clone(), 0.8));
//!     let generator = Arc::new(OpenAiChat::new(client, 0.9));
//!
//!     let service = GameService::builder(agents, generator).build();
//!     let game = service.start_default("demo").await?;
//!     println!("{}", game.info.intro_message);
//!
//!     let turn = service
//!         .chat("demo", "tom", "Where were you on Sunday evening?", None)
//!         .await?;
//!     println!("{}: {}", turn.character_name, turn.reply);
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod clue;
pub mod generator;
pub mod image;
pub mod llm;
pub mod progress;
pub mod prompts;
pub mod scenario;
pub mod service;
pub mod state;
pub mod store;
pub mod testing;
pub mod voice;

// Primary public API
pub use agents::{GameInfo, GameMaster, PersonaInfo, TurnError, TurnResponse};
pub use generator::{Difficulty, GenerationError, ScenarioGenerator};
pub use llm::{ChatModel, LlmError, ModelError, OpenAiChat, SchemaValidationError};
pub use scenario::{builtin_pack, Character, ConfigurationError, KnowledgePack, Solution, Victim};
pub use service::{new_game_id, GameService, ServiceError, StartedGame};
pub use state::{GameState, MessageEntry, Speaker};
pub use store::GameStateStore;
pub use testing::{MockModel, RecordingProgress, TestHarness};
